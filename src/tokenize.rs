//! Splitting of job specification lines and command strings.

/// Splits `line` on every `sep`, keeping empty fields.
pub fn fields(line: &str, sep: char) -> Vec<&str> {
    line.split(sep).collect()
}

/// Splits a command string into argv tokens.
///
/// Tokens are separated by whitespace. A double-quoted run forms part of a
/// single token and loses its quotes; an unterminated quote runs to the end
/// of the string.
pub fn args(command: &str) -> Vec<String> {
    let mut tokens = Vec::new();
    let mut current = String::new();
    let mut in_token = false;
    let mut quoted = false;

    for ch in command.chars() {
        match ch {
            '"' => {
                quoted = !quoted;
                in_token = true;
            }
            c if c.is_whitespace() && !quoted => {
                if in_token {
                    tokens.push(std::mem::take(&mut current));
                    in_token = false;
                }
            }
            c => {
                current.push(c);
                in_token = true;
            }
        }
    }

    if in_token {
        tokens.push(current);
    }

    tokens
}
