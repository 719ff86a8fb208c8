/// Starting system prompt when the user does not supply one.
pub const DEFAULT_SYSTEM_PROMPT: &str = r#"You are a customer support agent for an online store.

## Goals
- Resolve the customer's issue in as few turns as possible.
- Be polite, calm and professional at all times.

## How to help
1. Restate the customer's problem in one sentence to confirm you understood it.
2. Ask for the details you need (order number, product, dates) before proposing a fix.
3. Offer a concrete next step: a refund, a replacement, tracking information or an escalation.
4. Close by confirming the issue is resolved or explaining what happens next.

## Rules
- Never invent order data, policies or delivery dates.
- If you do not know something, say so and explain how the customer can find out.
- Keep answers short and easy to scan."#;

/// Rubric the evaluator scores a transcript against.
pub const DEFAULT_RUBRIC: &str = r#"You are an evaluator of customer support conversations. You receive a JSON list of interactions, each with `user_input` (the customer's message) and `agent_output` (the agent's reply). Judge how well the agent behaved across the whole list.

## Scoring

Start at 100 and deduct for each problem you find. Never go below 1.

**Critical (-20 each)**
- Fabricated facts: invents order data, policies, prices or dates.
- Unsupported conclusion: states a cause or outcome without evidence from the conversation.
- Rude or dismissive tone.
- Off-topic: drifts away from the customer's actual problem.

**High (-10 each)**
- Missing context: never asks for details needed to resolve the issue.
- Repetition: asks the same question or gives the same answer more than once.
- No next step: the customer is left without a concrete action or outcome.
- Unclear answer: reply is vague, contradictory or hard to follow.

**Low (-5 each)**
- Overly long reply for a simple question.
- Formatting that makes the reply hard to scan.

## Improvement instructions

For each deduction, write one instruction of at most 15 words that fixes the underlying behaviour in general terms (for example "Ask for the order number before proposing a fix"). Do not write fixes tied to the specific content of this conversation. Return 3 to 5 instructions, most important first."#;

const EVALUATION_FORMAT: &str = r#"## Required Response Format

Briefly list the problems you found, then end your response with exactly one evaluation block:

<evaluation>
{"score": 72, "improvement_instructions": ["instruction 1", "instruction 2", "instruction 3"]}
</evaluation>

`score` must be an integer from 1 to 100."#;

const REWRITER_INSTRUCTIONS: &str = r#"You are a prompt editor. You improve system prompts written for other AI agents.

You receive:
1. The existing system prompt, in full.
2. A list of improvement instructions written by an evaluator.

Produce a new version of the system prompt that applies the instructions with the smallest edits that work.

## Guidelines
- Keep the original format, tone and structure.
- For each instruction, ask what in the current prompt could be causing the problem, and change that.
- Generalise overly specific instructions into reusable behaviour rules.
- Do not remove or weaken parts of the prompt that are working.
- Do not add examples or use cases unless an instruction requires them.
- Do not rewrite the whole prompt unless several sections are badly broken.

## Required Response Format

End your response with exactly one rewrite block:

<rewrite>
{"new_prompt": "the full edited system prompt", "improvements": ["what changed and why (15 words max)"]}
</rewrite>

`new_prompt` must contain the complete prompt, not a diff."#;

/// Prompt templates for the evaluator and rewriter roles
pub struct CollabPrompts;

impl CollabPrompts {
    /// Evaluator instructions: rubric, optional custom criteria, response format.
    pub fn build_evaluator_instructions(rubric: &str, custom_criteria: Option<&str>) -> String {
        let mut instructions = rubric.trim_end().to_string();
        if let Some(criteria) = custom_criteria.map(str::trim).filter(|c| !c.is_empty()) {
            instructions.push_str("\n\nAdditional Custom Criteria:\n");
            instructions.push_str(criteria);
        }
        instructions.push_str("\n\n");
        instructions.push_str(EVALUATION_FORMAT);
        instructions
    }

    /// The message carrying the transcript to the evaluator.
    pub fn build_evaluation_request(transcript: &str) -> String {
        format!(
            "Evaluate this conversation log:\n\n```json\n{}\n```",
            transcript.trim()
        )
    }

    pub fn rewriter_instructions() -> &'static str {
        REWRITER_INSTRUCTIONS
    }

    /// The message carrying the old prompt and instructions to the rewriter.
    pub fn build_rewrite_request(old_prompt: &str, improvement_instructions: &[String]) -> String {
        let instructions = if improvement_instructions.is_empty() {
            "- (none; keep the prompt as it is unless something is clearly broken)".to_string()
        } else {
            improvement_instructions
                .iter()
                .map(|i| format!("- {}", i))
                .collect::<Vec<_>>()
                .join("\n")
        };

        format!(
            r#"## Existing System Prompt
<old_prompt>
{old_prompt}
</old_prompt>

## Improvement Instructions
{instructions}"#,
            old_prompt = old_prompt,
            instructions = instructions,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_custom_criteria_are_appended() {
        let instructions =
            CollabPrompts::build_evaluator_instructions("RUBRIC", Some("Always greet by name"));
        assert!(instructions.starts_with("RUBRIC\n\nAdditional Custom Criteria:\nAlways greet by name"));
        assert!(instructions.contains("<evaluation>"));
    }

    #[test]
    fn test_blank_criteria_are_ignored() {
        let instructions = CollabPrompts::build_evaluator_instructions("RUBRIC", Some("  "));
        assert!(!instructions.contains("Additional Custom Criteria"));
    }

    #[test]
    fn test_rewrite_request_lists_instructions() {
        let request = CollabPrompts::build_rewrite_request(
            "Be helpful.",
            &["Ask for order ids".to_string(), "Be brief".to_string()],
        );
        assert!(request.contains("<old_prompt>\nBe helpful.\n</old_prompt>"));
        assert!(request.contains("- Ask for order ids\n- Be brief"));
    }
}
