use colored::{ColoredString, Colorize};
use reconcile::Action;

/// Print an info message
pub fn info(msg: &str) {
    println!("{} {}", "ℹ".blue(), msg);
}

/// Print a success message
pub fn success(msg: &str) {
    println!("{} {}", "✓".green(), msg);
}

/// Print a warning message
pub fn warn(msg: &str) {
    println!("{} {}", "⚠".yellow(), msg);
}

/// Print an error message
pub fn error(msg: &str) {
    eprintln!("{} {}", "✗".red(), msg);
}

/// Print a dim/muted message
pub fn dim(msg: &str) {
    println!("  {}", msg.dimmed());
}

/// Print a header/title
pub fn header(title: &str) {
    println!();
    println!("{}", title.bold());
    println!("{}", "─".repeat(title.chars().count()).dimmed());
}

/// Print a section header
pub fn section(title: &str) {
    println!();
    println!("{}", title.cyan().bold());
}

/// Print a key-value pair
pub fn kv(key: &str, value: &str) {
    println!("  {}: {}", key.dimmed(), value);
}

/// `+` for creations, `-` for removals, `~` for everything else
pub fn action_symbol(action: &Action) -> ColoredString {
    if action.is_creation() {
        "+".green()
    } else if action.is_removal() {
        "-".red()
    } else {
        "~".yellow()
    }
}

pub fn plural(n: usize, word: &str) -> String {
    if n == 1 {
        format!("{n} {word}")
    } else {
        format!("{n} {word}s")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn symbols_follow_action_kind() {
        colored::control::set_override(false);
        let mkdir = Action::CreateDir {
            path: PathBuf::from(".veneer"),
        };
        let delete = Action::DeletePath {
            path: PathBuf::from(".veneer"),
            keep: Vec::new(),
        };
        let patch = Action::PatchText {
            path: PathBuf::from("AGENTS.md"),
            patch: reconcile::Patch::lines("@AGENTS.md"),
        };
        assert_eq!(action_symbol(&mkdir).to_string(), "+");
        assert_eq!(action_symbol(&delete).to_string(), "-");
        assert_eq!(action_symbol(&patch).to_string(), "~");
    }

    #[test]
    fn plural_counts() {
        assert_eq!(plural(0, "action"), "0 actions");
        assert_eq!(plural(1, "action"), "1 action");
        assert_eq!(plural(3, "package"), "3 packages");
    }
}
