use crate::ProtocolError;

/// One word of a command line. `quoted` is set when any part of it was inside
/// double quotes, which makes keywords such as `this` literal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Token {
    pub(crate) text: String,
    pub(crate) quoted: bool,
}

impl Token {
    pub(crate) fn is_keyword(&self, keyword: &str) -> bool {
        !self.quoted && self.text.eq_ignore_ascii_case(keyword)
    }
}

/// Split on whitespace; a double-quoted run is one token and may contain spaces.
pub(crate) fn tokenize(input: &str) -> Result<Vec<Token>, ProtocolError> {
    let mut tokens = Vec::new();
    let mut current = String::new();
    let mut in_token = false;
    let mut quoted = false;
    let mut was_quoted = false;

    for c in input.chars() {
        match c {
            '"' if quoted => {
                quoted = false;
            }
            '"' => {
                quoted = true;
                was_quoted = true;
                in_token = true;
            }
            c if c.is_whitespace() && !quoted => {
                if in_token {
                    tokens.push(Token {
                        text: std::mem::take(&mut current),
                        quoted: std::mem::take(&mut was_quoted),
                    });
                    in_token = false;
                }
            }
            c => {
                current.push(c);
                in_token = true;
            }
        }
    }

    if quoted {
        return Err(ProtocolError::UnterminatedQuote);
    }
    if in_token {
        tokens.push(Token {
            text: current,
            quoted: was_quoted,
        });
    }
    Ok(tokens)
}

#[cfg(test)]
mod tests {
    use super::tokenize;
    use crate::ProtocolError;

    #[test]
    fn splits_on_whitespace_and_keeps_quoted_runs() {
        let tokens = tokenize(r#"grant  command.master role "League Helper"   in "" "#).unwrap();
        let texts: Vec<&str> = tokens.iter().map(|token| token.text.as_str()).collect();
        assert_eq!(
            texts,
            ["grant", "command.master", "role", "League Helper", "in", ""]
        );
        let quoted: Vec<bool> = tokens.iter().map(|token| token.quoted).collect();
        assert_eq!(quoted, [false, false, false, true, false, true]);
        assert!(tokenize(" \t ").unwrap().is_empty());
    }

    #[test]
    fn quoted_keywords_are_literal() {
        let tokens = tokenize(r#"this "this" TH"is""#).unwrap();
        assert!(tokens[0].is_keyword("this"));
        assert!(!tokens[1].is_keyword("this"));
        assert_eq!(tokens[2].text, "THis");
        assert!(!tokens[2].is_keyword("this"));
    }

    #[test]
    fn rejects_unbalanced_quotes() {
        assert_eq!(
            tokenize(r#"role "Helper"#).unwrap_err(),
            ProtocolError::UnterminatedQuote
        );
    }
}
