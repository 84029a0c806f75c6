use crate::error::{Error, Result, ValidateError};

/// Wrap `value` in double quotes, backslash-escaping embedded `"` and `\`.
pub(crate) fn quote(value: &str) -> String {
    format!("\"{}\"", value.replace('\\', r"\\").replace('"', "\\\""))
}

/// Quote a string for use as a command argument, rejecting characters that cannot appear in a
/// quoted string.
pub(crate) fn validate_str(value: &str) -> Result<String> {
    if let Some(c) = value.chars().find(|&c| c == '\n' || c == '\r') {
        return Err(Error::Validate(ValidateError(c)));
    }
    Ok(quote(value))
}

/// Render zero-based message indices as an IMAP sequence set such as `1:3,7`.
pub(crate) fn sequence_set(indices: &[usize]) -> String {
    let mut sorted = indices.to_vec();
    sorted.sort_unstable();
    sorted.dedup();

    let mut ranges: Vec<(usize, usize)> = Vec::new();
    for i in sorted {
        match ranges.last_mut() {
            Some((_, end)) if *end + 1 == i => *end = i,
            _ => ranges.push((i, i)),
        }
    }
    iter_join(
        ranges.into_iter().map(|(a, b)| {
            if a == b {
                format!("{}", a + 1)
            } else {
                format!("{}:{}", a + 1, b + 1)
            }
        }),
        ",",
    )
}

/// Lovingly borrowed from the cargo crate
///
/// Joins an iterator of [std::fmt::Display]'ables into an output writable
pub(crate) fn iter_join_onto<W, I, T>(mut w: W, iter: I, delim: &str) -> std::fmt::Result
where
    W: std::fmt::Write,
    I: IntoIterator<Item = T>,
    T: std::fmt::Display,
{
    let mut it = iter.into_iter().peekable();
    while let Some(n) = it.next() {
        write!(w, "{}", n)?;
        if it.peek().is_some() {
            write!(w, "{}", delim)?;
        }
    }
    Ok(())
}

/// Lovingly borrowed from the cargo crate
///
/// Joins an iterator of [std::fmt::Display]'ables to a new [std::string::String].
pub(crate) fn iter_join<I, T>(iter: I, delim: &str) -> String
where
    I: IntoIterator<Item = T>,
    T: std::fmt::Display,
{
    let mut s = String::new();
    let _ = iter_join_onto(&mut s, iter, delim);
    s
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn quote_backslash() {
        assert_eq!("\"test\\\\text\"", quote(r"test\text"));
    }

    #[test]
    fn quote_dquote() {
        assert_eq!("\"test\\\"text\"", quote("test\"text"));
    }

    #[test]
    fn validate_random() {
        assert_eq!(
            "\"~iCQ_k;>[&\\\"sVCvUW`e<<P!wJ\"",
            &validate_str("~iCQ_k;>[&\"sVCvUW`e<<P!wJ").unwrap()
        );
    }

    #[test]
    fn validate_newline() {
        match validate_str("test\nstring") {
            Err(Error::Validate(ValidateError('\n'))) => {}
            r => panic!("Wrong result: {:?}", r),
        }
    }

    #[test]
    fn validate_carriage_return() {
        match validate_str("test\rstring") {
            Err(Error::Validate(ValidateError('\r'))) => {}
            r => panic!("Wrong result: {:?}", r),
        }
    }

    #[test]
    fn sequence_sets() {
        assert_eq!(sequence_set(&[0, 1, 2, 6]), "1:3,7");
        assert_eq!(sequence_set(&[4, 2, 3, 3]), "3:5");
        assert_eq!(sequence_set(&[9]), "10");
        assert_eq!(sequence_set(&[]), "");
    }

    #[test]
    fn join() {
        assert_eq!(iter_join(["\\Seen", "\\Flagged"], " "), "\\Seen \\Flagged");
        assert_eq!(iter_join(Vec::<String>::new(), " "), "");
    }
}
