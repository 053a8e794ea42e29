use std::fmt::Display;

/// Join prompt fragments with newlines, strip the indentation they all share and
/// drop the blank lines around the result.
///
/// Handy for prompts written as indented raw strings next to the code using them.
///
/// ```rust
/// use flowchat::autodedent;
///
/// let code = "
///     fn add(a: i32, b: i32) -> i32 {
///         a + b
///     }
/// ";
///
/// let prompt = autodedent(["What does this code do?", code]);
/// assert!(prompt.starts_with("What does this code do?\n"));
/// ```
pub fn autodedent<I, S>(fragments: I) -> String
where
    I: IntoIterator<Item = S>,
    S: Display,
{
    let joined = fragments
        .into_iter()
        .map(|fragment| fragment.to_string())
        .collect::<Vec<_>>()
        .join("\n");

    dedent(&joined).trim_matches('\n').to_string()
}

/// Variadic form of [`autodedent`], accepts any mix of `Display` values.
#[macro_export]
macro_rules! autodedent {
    ($($fragment:expr),+ $(,)?) => {
        $crate::tools::dedent::autodedent([$(::std::string::ToString::to_string(&$fragment)),+])
    };
}

/// Remove the longest run of spaces and tabs shared by every non-blank line.
/// Blank lines are normalized to empty ones.
fn dedent(text: &str) -> String {
    let mut margin: Option<&str> = None;

    for line in text.split('\n') {
        if is_blank(line) {
            continue;
        }

        let indent = leading_indent(line);
        margin = Some(match margin {
            None => indent,
            Some(current) => common_prefix(current, indent),
        });
    }

    let margin = margin.unwrap_or("");
    text.split('\n')
        .map(|line| {
            if is_blank(line) {
                ""
            } else {
                line.strip_prefix(margin).unwrap_or(line)
            }
        })
        .collect::<Vec<_>>()
        .join("\n")
}

fn is_blank(line: &str) -> bool {
    line.trim_matches([' ', '\t']).is_empty()
}

fn leading_indent(line: &str) -> &str {
    let rest = line.trim_start_matches([' ', '\t']);
    &line[..line.len() - rest.len()]
}

// Indents are made of ASCII spaces and tabs only, byte slicing is safe
fn common_prefix<'a>(left: &'a str, right: &str) -> &'a str {
    let shared = left
        .bytes()
        .zip(right.bytes())
        .take_while(|(l, r)| l == r)
        .count();
    &left[..shared]
}
