use anyhow::Result;
use colored::Colorize;

use promptloop_store::{LedgerEntry, PromptLedger};

use crate::{state_dir, working_dir, LedgerArgs};

pub fn handle_ledger(args: LedgerArgs) -> Result<()> {
    let working_dir = working_dir()?;
    let ledger = PromptLedger::in_dir(&state_dir(args.state_dir.as_deref(), &working_dir));

    let mut entries = ledger.read_all()?;
    let first_number = if args.latest && !entries.is_empty() {
        let last = entries.len();
        entries.drain(..last - 1);
        last
    } else {
        1
    };

    if args.json {
        println!("{}", serde_json::to_string_pretty(&entries)?);
    } else if entries.is_empty() {
        println!(
            "{} {}",
            "No accepted prompts in".dimmed(),
            ledger.path().display().to_string().dimmed()
        );
    } else {
        print_entries(&entries, first_number);
    }

    Ok(())
}

fn print_entries(entries: &[LedgerEntry], first_number: usize) {
    for (offset, entry) in entries.iter().enumerate() {
        let header = format!("─ Prompt {} ", first_number + offset);
        println!(
            "{}{}",
            header.bright_blue().bold(),
            "─".repeat(60usize.saturating_sub(header.chars().count())).bright_blue()
        );
        if entry.improvements.is_empty() {
            println!("  {}", "(no improvements listed)".dimmed());
        }
        for improvement in &entry.improvements {
            println!("  {} {}", "+".bright_green(), improvement);
        }
        println!();
        for line in entry.new_prompt.lines() {
            println!("  {}", line);
        }
        println!();
    }
}
