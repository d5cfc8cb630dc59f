const REPLACEMENT: char = '\u{FFFD}';

/// Decoded slice of the pty byte stream.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Decoded {
    /// Relay text; malformed sequences appear as U+FFFD.
    pub text: String,
    /// Number of malformed sequences replaced in `text`.
    pub malformed: usize,
}

impl Decoded {
    /// Text fit for classification: replacement characters from malformed
    /// input are dropped.
    pub fn classifiable(&self) -> String {
        if self.malformed == 0 {
            self.text.clone()
        } else {
            self.text.chars().filter(|ch| *ch != REPLACEMENT).collect()
        }
    }
}

/// Incremental UTF-8 decoder that carries incomplete trailing sequences over
/// to the next chunk instead of mangling characters split across reads.
#[derive(Debug, Default)]
pub struct Utf8Stream {
    pending: Vec<u8>,
}

impl Utf8Stream {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, bytes: &[u8]) -> Decoded {
        self.pending.extend_from_slice(bytes);
        let mut decoded = Decoded::default();
        let mut rest: &[u8] = &self.pending;
        loop {
            match std::str::from_utf8(rest) {
                Ok(valid) => {
                    decoded.text.push_str(valid);
                    rest = &[];
                    break;
                }
                Err(err) => {
                    let (valid, after) = rest.split_at(err.valid_up_to());
                    decoded.text.push_str(&String::from_utf8_lossy(valid));
                    match err.error_len() {
                        Some(len) => {
                            decoded.text.push(REPLACEMENT);
                            decoded.malformed += 1;
                            rest = &after[len..];
                        }
                        None => {
                            rest = after;
                            break;
                        }
                    }
                }
            }
        }
        self.pending = rest.to_vec();
        decoded
    }

    /// Drains whatever is left once the stream has ended.
    pub fn finish(&mut self) -> Decoded {
        if self.pending.is_empty() {
            return Decoded::default();
        }
        let pending = std::mem::take(&mut self.pending);
        Decoded {
            text: String::from_utf8_lossy(&pending).into_owned(),
            malformed: 1,
        }
    }
}
