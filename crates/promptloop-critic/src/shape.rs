use serde::de::DeserializeOwned;
use thiserror::Error;
use tracing::debug;

/// Agent output that does not have the shape a role promised.
#[derive(Error, Debug)]
pub enum ShapeError {
    #[error("No <{0}> block or JSON object found in agent output")]
    MissingBlock(&'static str),

    #[error("Malformed <{0}> block")]
    MalformedBlock(&'static str),

    #[error("Failed to parse {tag} JSON: {source}")]
    Json {
        tag: &'static str,
        #[source]
        source: serde_json::Error,
    },

    #[error("Field `{0}` is empty")]
    EmptyField(&'static str),

    #[error("Agent returned no output")]
    EmptyOutput,

    #[error("Score {0} is outside 1..=100")]
    ScoreOutOfRange(i64),
}

/// A typed result parsed from an agent's raw text output.
pub trait OutputShape: Sized + Send {
    fn parse(raw: &str) -> Result<Self, ShapeError>;
}

/// Free-text answer from the responder role.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reply(pub String);

impl OutputShape for Reply {
    fn parse(raw: &str) -> Result<Self, ShapeError> {
        let text = raw.trim();
        if text.is_empty() {
            return Err(ShapeError::EmptyOutput);
        }
        Ok(Reply(text.to_string()))
    }
}

/// Extract and deserialize the JSON payload of a `<tag>...</tag>` block.
///
/// The last block wins. Without a block, the outermost `{...}` span of the
/// output is tried instead, which covers agents that answer with bare JSON or a
/// fenced code block.
pub(crate) fn parse_tagged<T: DeserializeOwned>(
    raw: &str,
    tag: &'static str,
) -> Result<T, ShapeError> {
    debug!(output_len = raw.len(), tag, "Parsing tagged block");

    let json = match find_block(raw, tag)? {
        Some(body) => body,
        None => find_object(raw).ok_or(ShapeError::MissingBlock(tag))?,
    };

    serde_json::from_str(json).map_err(|source| ShapeError::Json { tag, source })
}

fn find_block<'a>(raw: &'a str, tag: &'static str) -> Result<Option<&'a str>, ShapeError> {
    let open = format!("<{}>", tag);
    let close = format!("</{}>", tag);

    match (raw.rfind(&open), raw.rfind(&close)) {
        (Some(start), Some(end)) if start < end => {
            let body = raw[start + open.len()..end].trim();
            Ok(Some(strip_fence(body)))
        }
        (Some(_), _) | (None, Some(_)) => Err(ShapeError::MalformedBlock(tag)),
        (None, None) => Ok(None),
    }
}

fn find_object(raw: &str) -> Option<&str> {
    let start = raw.find('{')?;
    let end = raw.rfind('}')?;
    (start < end).then(|| &raw[start..=end])
}

fn strip_fence(body: &str) -> &str {
    let Some(rest) = body.strip_prefix("```") else {
        return body;
    };
    let rest = rest.strip_prefix("json").unwrap_or(rest);
    rest.strip_suffix("```").unwrap_or(rest).trim()
}
