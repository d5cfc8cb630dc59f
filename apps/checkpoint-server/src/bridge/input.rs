use super::SharedInput;

const SUBMIT: char = '\r';
const BACKSPACE: char = '\x08';
const DELETE: char = '\x7f';
const INTERRUPT: char = '\x03';
const KILL_LINE: char = '\x15';
const ESCAPE: char = '\x1b';

/// Feeds one `stdin` payload into the command line being typed and returns
/// every command submitted by it, in order.
///
/// Escape sequences (arrow keys, function keys) are recorded as the last
/// keystroke but never become part of the command text. Every payload,
/// Enter and Backspace included, replaces the last keystroke. Other control
/// characters are ignored, except Ctrl-C and Ctrl-U which discard the line.
pub fn accumulate(shared: &mut SharedInput, payload: &str) -> Vec<String> {
    shared.set_last_keystroke(payload);
    if payload.starts_with(ESCAPE) {
        return Vec::new();
    }

    let mut submitted = Vec::new();
    for ch in payload.chars() {
        match ch {
            SUBMIT => {
                let line = std::mem::take(&mut shared.pending);
                let command = line.trim();
                if !command.is_empty() {
                    submitted.push(command.to_string());
                }
            }
            BACKSPACE | DELETE => {
                shared.pending.pop();
            }
            INTERRUPT | KILL_LINE => shared.pending.clear(),
            ch if ch.is_control() && ch != '\t' => {}
            ch => shared.pending.push(ch),
        }
    }
    submitted
}

#[cfg(test)]
mod tests {
    use super::*;

    fn feed(shared: &mut SharedInput, keys: &[&str]) -> Vec<String> {
        keys.iter()
            .flat_map(|key| accumulate(shared, key))
            .collect()
    }

    #[test]
    fn carriage_return_submits_trimmed_line() {
        let mut shared = SharedInput::default();
        assert_eq!(feed(&mut shared, &["g", "o", " "]), Vec::<String>::new());
        assert_eq!(shared.pending_command(), "go ");
        assert_eq!(feed(&mut shared, &["\r"]), vec!["go".to_string()]);
        assert_eq!(shared.pending_command(), "");
        assert_eq!(shared.last_keystroke(), "\r");
    }

    #[test]
    fn blank_lines_are_not_commands() {
        let mut shared = SharedInput::default();
        assert!(feed(&mut shared, &["\r", " ", " ", "\r"]).is_empty());
    }

    #[test]
    fn backspace_and_delete_pop_characters() {
        let mut shared = SharedInput::default();
        let commands = feed(&mut shared, &["l", "x", "\x7f", "s", "z", "\x08", "\r"]);
        assert_eq!(commands, vec!["ls".to_string()]);
        // Popping an empty line is harmless.
        assert!(feed(&mut shared, &["\x7f", "\x7f", "\r"]).is_empty());
    }

    #[test]
    fn pasted_text_can_hold_several_commands() {
        let mut shared = SharedInput::default();
        let commands = accumulate(&mut shared, "cd /tmp\rls -la\rpw");
        assert_eq!(commands, vec!["cd /tmp".to_string(), "ls -la".to_string()]);
        assert_eq!(shared.pending_command(), "pw");
    }

    #[test]
    fn escape_sequences_do_not_reach_the_command() {
        let mut shared = SharedInput::default();
        let commands = feed(&mut shared, &["e", "\x1b[A", "c", "\x1b[D", "\r"]);
        assert_eq!(commands, vec!["ec".to_string()]);
    }

    #[test]
    fn interrupt_discards_the_line() {
        let mut shared = SharedInput::default();
        assert!(feed(&mut shared, &["r", "m", "\x03", "\r"]).is_empty());
    }
}
