//! Windows command-line tokenizing and quoting.
//!
//! Windows hands a process a single command-line string; programs split it
//! themselves. These helpers follow the MSVCRT rules so an argument list
//! survives a round trip through `argv_to_command_line` and
//! `command_line_to_argv`.

fn is_whitespace(c: char) -> bool {
    c == ' ' || c == '\t'
}

/// Split a command line into arguments.
///
/// Rules:
/// - space and tab separate arguments outside quotes
/// - `2n` backslashes before a quote yield `n` backslashes and toggle quoting
/// - `2n+1` backslashes before a quote yield `n` backslashes and a literal quote
/// - backslashes not followed by a quote are literal
/// - `""` inside a quoted run yields a literal quote
pub fn command_line_to_argv(command_line: &str) -> Vec<String> {
    let chars: Vec<char> = command_line
        .trim_matches(|c: char| c.is_whitespace() || c == '\0')
        .chars()
        .collect();
    let mut arguments = Vec::new();
    let mut position = 0;

    while position < chars.len() {
        while position < chars.len() && is_whitespace(chars[position]) {
            position += 1;
        }
        if position >= chars.len() {
            break;
        }
        arguments.push(parse_argument(&chars, &mut position));
    }
    arguments
}

fn parse_argument(chars: &[char], position: &mut usize) -> String {
    let mut argument = String::new();
    let mut in_quote = false;

    while *position < chars.len() {
        let c = chars[*position];
        if is_whitespace(c) && !in_quote {
            break;
        }

        match c {
            '\\' => {
                let start = *position;
                while *position < chars.len() && chars[*position] == '\\' {
                    *position += 1;
                }
                let count = *position - start;

                if *position < chars.len() && chars[*position] == '"' {
                    argument.extend(std::iter::repeat('\\').take(count / 2));
                    if count % 2 == 1 {
                        argument.push('"');
                    } else {
                        in_quote = !in_quote;
                    }
                    *position += 1;
                } else {
                    argument.extend(std::iter::repeat('\\').take(count));
                }
            }
            '"' => {
                if in_quote && chars.get(*position + 1) == Some(&'"') {
                    argument.push('"');
                    *position += 2;
                } else {
                    in_quote = !in_quote;
                    *position += 1;
                }
            }
            _ => {
                argument.push(c);
                *position += 1;
            }
        }
    }
    argument
}

/// Quote one argument so `command_line_to_argv` reproduces it exactly.
pub fn quote_argument(argument: &str) -> String {
    let needs_quoting =
        argument.is_empty() || argument.chars().any(|c| is_whitespace(c) || c == '"');
    if !needs_quoting {
        return argument.to_string();
    }

    let mut quoted = String::with_capacity(argument.len() + 2);
    quoted.push('"');
    let mut backslashes = 0usize;

    for c in argument.chars() {
        match c {
            '\\' => backslashes += 1,
            '"' => {
                quoted.extend(std::iter::repeat('\\').take(backslashes * 2 + 1));
                quoted.push('"');
                backslashes = 0;
            }
            _ => {
                quoted.extend(std::iter::repeat('\\').take(backslashes));
                quoted.push(c);
                backslashes = 0;
            }
        }
    }
    // Trailing backslashes precede the closing quote, so they are doubled.
    quoted.extend(std::iter::repeat('\\').take(backslashes * 2));
    quoted.push('"');
    quoted
}

/// Join arguments into a single command line.
pub fn argv_to_command_line<S: AsRef<str>>(argv: &[S]) -> String {
    argv.iter()
        .map(|arg| quote_argument(arg.as_ref()))
        .collect::<Vec<_>>()
        .join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn argv(line: &str) -> Vec<String> {
        command_line_to_argv(line)
    }

    #[test]
    fn test_simple_arguments() {
        assert_eq!(
            argv("setup.exe /quiet  /norestart"),
            ["setup.exe", "/quiet", "/norestart"]
        );
        assert_eq!(argv("a\tb"), ["a", "b"]);
        assert!(argv("   ").is_empty());
    }

    #[test]
    fn test_quoted_path_with_spaces() {
        assert_eq!(
            argv(r#""C:\Program Files\App\app.exe" -flag "two words""#),
            [r"C:\Program Files\App\app.exe", "-flag", "two words"]
        );
    }

    #[test]
    fn test_backslash_rules() {
        // 2n backslashes + quote
        assert_eq!(argv(r#""a\\" b"#), [r"a\", "b"]);
        // 2n+1 backslashes + quote
        assert_eq!(argv(r#"a\"b"#), [r#"a"b"#]);
        assert_eq!(argv(r#"a\\\"b"#), [r#"a\"b"#]);
        // backslashes not before a quote
        assert_eq!(argv(r"a\\b\c"), [r"a\\b\c"]);
    }

    #[test]
    fn test_doubled_quote_inside_quotes() {
        assert_eq!(argv(r#""say ""hi"" now""#), [r#"say "hi" now"#]);
    }

    #[test]
    fn test_empty_quoted_argument_is_kept() {
        assert_eq!(argv(r#"app.exe "" x"#), ["app.exe", "", "x"]);
    }

    #[test]
    fn test_quote_argument() {
        assert_eq!(quote_argument("plain"), "plain");
        assert_eq!(quote_argument(""), r#""""#);
        assert_eq!(quote_argument("two words"), r#""two words""#);
        assert_eq!(quote_argument(r"C:\dir with space\"), r#""C:\dir with space\\""#);
        assert_eq!(quote_argument(r#"say "hi""#), r#""say \"hi\"""#);
        assert_eq!(quote_argument(r"no\space\"), r"no\space\");
    }

    #[test]
    fn test_command_line_round_trip() {
        let original: Vec<String> = [
            r"C:\Program Files\App\app.exe",
            "",
            r#"quote " inside"#,
            r"trailing\",
            r"dir with space\",
            "tab\there",
        ]
        .iter()
        .map(|s| s.to_string())
        .collect();

        let line = argv_to_command_line(&original);
        assert_eq!(command_line_to_argv(&line), original);
    }
}
