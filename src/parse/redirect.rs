/// An output redirection that can write to the filesystem.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Redirection {
    /// Operator as written, e.g. `>`, `>>`, `2>`, `&>`.
    pub operator: String,
}

impl Redirection {
    fn new(operator: impl Into<String>) -> Self {
        Self {
            operator: operator.into(),
        }
    }

    pub fn description(&self) -> String {
        format!("output redirection ({})", self.operator)
    }
}

/// Find output redirection (`>`, `>>`, `&>`, `N>`) outside quotes.
///
/// Not flagged: input redirection and here-docs, fd duplication or closing
/// (`2>&1`, `>&2`, `2>&-`), and process substitution `>(...)`.
pub fn output_redirection(command: &str) -> Option<Redirection> {
    let chars: Vec<char> = command.chars().collect();
    let at = |i: usize| chars.get(i).copied();
    let is_fd_target = |c: Option<char>| c.is_some_and(|c| c.is_ascii_digit() || c == '-');

    let (mut single, mut double) = (false, false);
    let mut i = 0;
    while let Some(c) = at(i) {
        match c {
            '\\' if !single => {
                i += 2;
                continue;
            }
            '\'' if !double => single = !single,
            '"' if !single => double = !double,
            _ if single || double => {}
            '&' if at(i + 1) == Some('>') => {
                let op = if at(i + 2) == Some('>') { "&>>" } else { "&>" };
                return Some(Redirection::new(op));
            }
            d if d.is_ascii_digit() && at(i + 1) == Some('>') => {
                if at(i + 2) == Some('&') && is_fd_target(at(i + 3)) {
                    i += 4;
                    continue;
                }
                let op = if at(i + 2) == Some('>') {
                    format!("{d}>>")
                } else {
                    format!("{d}>")
                };
                return Some(Redirection::new(op));
            }
            '>' => {
                if at(i + 1) == Some('(') {
                    i += 2;
                    continue;
                }
                if at(i + 1) == Some('&') && is_fd_target(at(i + 2)) {
                    i += 3;
                    continue;
                }
                let op = if at(i + 1) == Some('>') { ">>" } else { ">" };
                return Some(Redirection::new(op));
            }
            _ => {}
        }
        i += 1;
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    fn op(command: &str) -> Option<String> {
        output_redirection(command).map(|r| r.operator)
    }

    #[test]
    fn simple_gt() {
        assert_eq!(op("ls > file").as_deref(), Some(">"));
    }

    #[test]
    fn append() {
        assert_eq!(op("ls >> file").as_deref(), Some(">>"));
    }

    #[test]
    fn ampersand_gt() {
        assert_eq!(op("cmd &> file").as_deref(), Some("&>"));
    }

    #[test]
    fn stderr_to_file() {
        assert_eq!(op("cmd 2> err.log").as_deref(), Some("2>"));
    }

    #[test]
    fn fd_dup_is_not_redirection() {
        assert_eq!(op("cmd 2>&1"), None);
        assert_eq!(op("cmd >&2"), None);
        assert_eq!(op("cmd 2>&-"), None);
    }

    #[test]
    fn process_substitution_is_not_redirection() {
        assert_eq!(op("tee >(sort)"), None);
    }

    #[test]
    fn quoted_gt_ignored() {
        assert_eq!(op("echo 'a > b'"), None);
        assert_eq!(op("echo \"a > b\""), None);
    }

    #[test]
    fn escaped_gt_ignored() {
        assert_eq!(op("echo a \\> b"), None);
    }

    #[test]
    fn input_redirection_ignored() {
        assert_eq!(op("sort < data.txt"), None);
        assert_eq!(op("cat <<EOF"), None);
    }

    #[test]
    fn description_names_operator() {
        let r = output_redirection("echo hi > out").unwrap();
        assert_eq!(r.description(), "output redirection (>)");
    }
}
