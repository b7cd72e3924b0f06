//! Shared helpers for the scalar side of the comparators.

/// Classic four-character soundex over the ASCII letters of the input.
///
/// Returns None when the input contains no ASCII letter, which lines up with
/// SOUNDEX returning the empty string for such inputs on the SQL side.
pub fn soundex4(input: &str) -> Option<String> {
    let mut letters = input.chars().filter(|c| c.is_ascii_alphabetic());
    let first = letters.next()?;
    let mut code = String::with_capacity(4);
    code.push(first.to_ascii_uppercase());
    let mut last = soundex_digit(first);
    for ch in letters {
        match soundex_digit(ch) {
            Some(d) => {
                if last != Some(d) {
                    code.push((b'0' + d) as char);
                    if code.len() == 4 {
                        break;
                    }
                }
                last = Some(d);
            }
            None => {
                // vowels break a run of same-coded consonants; h and w do not
                if !matches!(ch.to_ascii_lowercase(), 'h' | 'w') {
                    last = None;
                }
            }
        }
    }
    while code.len() < 4 {
        code.push('0');
    }
    Some(code)
}

fn soundex_digit(ch: char) -> Option<u8> {
    match ch.to_ascii_lowercase() {
        'b' | 'f' | 'p' | 'v' => Some(1),
        'c' | 'g' | 'j' | 'k' | 'q' | 's' | 'x' | 'z' => Some(2),
        'd' | 't' => Some(3),
        'l' => Some(4),
        'm' | 'n' => Some(5),
        'r' => Some(6),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_soundex_classic_pairs() {
        assert_eq!(soundex4("robert").as_deref(), Some("R163"));
        assert_eq!(soundex4("rupert").as_deref(), Some("R163"));
        assert_eq!(soundex4("smith"), soundex4("smyth"));
        assert_eq!(soundex4("smith").as_deref(), Some("S530"));
    }

    #[test]
    fn test_soundex_ignores_non_letters() {
        assert_eq!(soundex4("o'brien"), soundex4("obrien"));
        assert_eq!(soundex4("de la cruz"), soundex4("delacruz"));
    }

    #[test]
    fn test_soundex_empty_inputs() {
        assert_eq!(soundex4(""), None);
        assert_eq!(soundex4("123"), None);
        assert_eq!(soundex4("'-"), None);
    }

    #[test]
    fn test_soundex_padding_and_truncation() {
        assert_eq!(soundex4("a").as_deref(), Some("A000"));
        assert_eq!(soundex4("hello").as_deref(), Some("H400"));
        assert_eq!(soundex4("washington").as_deref(), Some("W252"));
    }
}
