//! Free-form German address parsing.

/// Components extracted from a free-form address line. Any of them may be
/// missing; parsing never fails.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct ParsedAddress {
    pub street: Option<String>,
    pub house_number: Option<String>,
    pub postal_code: Option<String>,
    pub city: Option<String>,
}

impl ParsedAddress {
    /// Parse a free-form address like `"Petuelring 130, 80809 München"`.
    pub fn parse(raw: &str) -> ParsedAddress {
        let raw = raw.trim();
        if raw.is_empty() {
            return ParsedAddress::default();
        }

        let postal = find_postal_code(raw);

        let city = match postal {
            Some((start, len)) => {
                let after = &raw[start + len..];
                let city = after
                    .split(',')
                    .next()
                    .unwrap_or("")
                    .trim()
                    .trim_matches(',');
                if city.is_empty() {
                    None
                } else {
                    Some(city.to_owned())
                }
            }
            None => raw
                .rsplit(',')
                .next()
                .map(str::trim)
                .filter(|s| !s.is_empty() && *s != raw)
                .map(str::to_owned),
        };

        // The street part is everything before the first comma, or before the
        // postal code when the address has no comma separation.
        let street_end = raw
            .find(',')
            .or(postal.map(|(start, _)| start))
            .unwrap_or(raw.len());
        let street_part = raw[..street_end].trim().trim_end_matches(',').trim();

        let (street, house_number) = split_house_number(street_part);

        ParsedAddress {
            street,
            house_number,
            postal_code: postal.map(|(start, len)| raw[start..start + len].to_owned()),
            city,
        }
    }
}

/// First run of exactly five digits with non-alphanumeric neighbors.
/// Returns `(byte_offset, byte_len)`.
fn find_postal_code(s: &str) -> Option<(usize, usize)> {
    let chars: Vec<(usize, char)> = s.char_indices().collect();
    let mut i = 0;
    while i < chars.len() {
        if chars[i].1.is_ascii_digit() {
            let run_start = i;
            while i < chars.len() && chars[i].1.is_ascii_digit() {
                i += 1;
            }
            let run_len = i - run_start;
            let before_ok = run_start == 0 || !chars[run_start - 1].1.is_alphanumeric();
            let after_ok = i == chars.len() || !chars[i].1.is_alphanumeric();
            if run_len == 5 && before_ok && after_ok {
                let start = chars[run_start].0;
                return Some((start, 5));
            }
        } else {
            i += 1;
        }
    }
    None
}

/// Split `"Petuelring 130a"` into street and trailing house number. The house
/// number is a digit run with an optional letter suffix.
fn split_house_number(street_part: &str) -> (Option<String>, Option<String>) {
    if street_part.is_empty() {
        return (None, None);
    }

    let chars: Vec<char> = street_part.chars().collect();
    let mut suffix_len = 0;
    // Optional single-letter suffix ("130a", "12b").
    if matches!(chars.last(), Some(c) if c.is_alphabetic())
        && chars.len() >= 2
        && chars[chars.len() - 2].is_ascii_digit()
    {
        suffix_len = 1;
    }
    let digit_end = chars.len() - suffix_len;
    let mut digit_start = digit_end;
    while digit_start > 0 && chars[digit_start - 1].is_ascii_digit() {
        digit_start -= 1;
    }

    if digit_start == digit_end {
        // No trailing digits: the whole thing is the street.
        return (Some(street_part.to_owned()), None);
    }

    let house: String = chars[digit_start..].iter().collect();
    let street: String = chars[..digit_start]
        .iter()
        .collect::<String>()
        .trim()
        .trim_end_matches(',')
        .to_owned();

    (
        if street.is_empty() {
            None
        } else {
            Some(street)
        },
        Some(house),
    )
}
