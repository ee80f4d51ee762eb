use regex::Regex;
use thiserror::Error;

const ARTICLE_ID_SEPARATOR: char = '_';
const CHAPTER_PREFIX: &str = "CHAPITRE";

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub(crate) enum NumberParseFailure {
    #[error("identifier {token:?} has no ordinal after '_'")]
    MissingOrdinal { token: String },
    #[error("identifier {token:?} ordinal {segment:?} is not a positive integer")]
    NotPositiveInteger { token: String, segment: String },
}

/// Parses `art_123` into `123`. The second `_`-separated segment must be a
/// positive integer; anything else (`art_X`, `art_0`, `art_1.tit_1`) fails.
pub(crate) fn parse_article_number(token: &str) -> Result<u32, NumberParseFailure> {
    let Some(segment) = token.split(ARTICLE_ID_SEPARATOR).nth(1) else {
        return Err(NumberParseFailure::MissingOrdinal {
            token: token.to_string(),
        });
    };

    match segment.parse::<u32>() {
        Ok(number) if number > 0 => Ok(number),
        _ => Err(NumberParseFailure::NotPositiveInteger {
            token: token.to_string(),
            segment: segment.to_string(),
        }),
    }
}

/// Strips the `CHAPITRE` prefix (any case) and surrounding whitespace from a
/// chapter heading. The remainder is returned verbatim.
pub(crate) fn parse_chapter_label(heading: &str) -> String {
    let trimmed = heading.trim();
    let rest = trimmed
        .get(..CHAPTER_PREFIX.len())
        .filter(|head| head.eq_ignore_ascii_case(CHAPTER_PREFIX))
        .map(|_| &trimmed[CHAPTER_PREFIX.len()..])
        .unwrap_or(trimmed);

    rest.trim().to_string()
}

/// Numeric value of a chapter label written in arabic or roman numerals.
pub(crate) fn chapter_ordinal(label: &str) -> Option<u32> {
    let label = label.trim();
    if label.is_empty() {
        return None;
    }

    if label.chars().all(|ch| ch.is_ascii_digit()) {
        return label.parse::<u32>().ok().filter(|value| *value > 0);
    }

    roman_to_arabic(label)
}

/// Numeric value of an annex label, which is always a roman numeral.
pub(crate) fn annex_ordinal(label: &str) -> Option<u32> {
    roman_to_arabic(label.trim())
}

/// Reads the `(12)` marker that opens a recital. Text without a leading
/// marker is a continuation of the previous recital.
pub(crate) fn parse_recital_marker(text: &str, marker_regex: &Regex) -> Option<u32> {
    marker_regex
        .captures(text.trim())
        .and_then(|captures| captures.name("number"))
        .and_then(|number| number.as_str().parse::<u32>().ok())
        .filter(|number| *number > 0)
}

/// Splits `ANNEXE III` or `ANNEXE III - Intitulé` into the roman label and
/// the optional inline title.
pub(crate) fn parse_annex_heading(
    heading: &str,
    heading_regex: &Regex,
) -> Option<(String, Option<String>)> {
    let captures = heading_regex.captures(heading.trim())?;
    let label = captures.name("label")?.as_str().to_string();
    let title = captures
        .name("title")
        .map(|title| title.as_str().trim().to_string())
        .filter(|title| !title.is_empty());
    Some((label, title))
}

fn roman_to_arabic(numeral: &str) -> Option<u32> {
    let values = numeral
        .chars()
        .map(|ch| match ch.to_ascii_uppercase() {
            'I' => Some(1),
            'V' => Some(5),
            'X' => Some(10),
            'L' => Some(50),
            'C' => Some(100),
            'D' => Some(500),
            'M' => Some(1000),
            _ => None,
        })
        .collect::<Option<Vec<i64>>>()?;

    let mut total = 0_i64;
    for (index, value) in values.iter().enumerate() {
        match values.get(index + 1) {
            Some(next) if next > value => total -= value,
            _ => total += value,
        }
    }

    u32::try_from(total).ok().filter(|value| *value > 0)
}
