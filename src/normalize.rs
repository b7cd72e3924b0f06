use chrono::NaiveDate;

/// Remove diacritics by decomposing to NFD and filtering combining marks.
pub fn fold_marks(input: &str) -> String {
    use unicode_normalization::UnicodeNormalization;
    input
        .nfd()
        .filter(|c| !unicode_normalization::char::is_combining_mark(*c))
        .collect()
}

/// Name normalization: fold diacritics, lowercase, drop dots, replace dashes
/// with spaces, collapse whitespace. Empty results become the unknown
/// sentinel (None) rather than an error.
pub fn normalize_name(input: Option<&str>) -> Option<String> {
    let raw = input?;
    let folded = fold_marks(raw);
    let mut out = String::with_capacity(folded.len());
    for ch in folded.chars() {
        match ch {
            '.' => { /* drop dot */ }
            '-' => out.push(' '),
            _ => {
                for lc in ch.to_lowercase() {
                    out.push(lc);
                }
            }
        }
    }
    let collapsed = out.split_whitespace().collect::<Vec<_>>().join(" ");
    if collapsed.is_empty() {
        if !raw.trim().is_empty() {
            log::debug!("name value {:?} normalized to empty; treating as unknown", raw);
        }
        None
    } else {
        Some(collapsed)
    }
}

/// Postcode normalization: uppercase, keep ASCII letters and digits only.
pub fn normalize_postcode(input: Option<&str>) -> Option<String> {
    let raw = input?;
    let out: String = raw
        .chars()
        .flat_map(char::to_uppercase)
        .filter(char::is_ascii_alphanumeric)
        .collect();
    if out.is_empty() {
        if !raw.trim().is_empty() {
            log::debug!("postcode value {:?} normalized to empty; treating as unknown", raw);
        }
        None
    } else {
        Some(out)
    }
}

/// Date normalization: strict ISO calendar date, with a datetime prefix
/// accepted the way DATE() truncates one. Unparseable values become the
/// unknown sentinel.
pub fn normalize_dob(input: Option<&str>) -> Option<NaiveDate> {
    let raw = input?.trim();
    if raw.is_empty() {
        return None;
    }
    if let Ok(d) = NaiveDate::parse_from_str(raw, "%Y-%m-%d") {
        return Some(d);
    }
    if let Some(prefix) = raw.get(..10) {
        if let Ok(d) = NaiveDate::parse_from_str(prefix, "%Y-%m-%d") {
            return Some(d);
        }
    }
    log::debug!("dob value {:?} is not a calendar date; treating as unknown", raw);
    None
}
