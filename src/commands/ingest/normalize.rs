use scraper::ElementRef;

/// Trims every fragment and joins them with `\n`, keeping their order.
/// No fragments yields an empty string.
pub(crate) fn normalize_content<I, S>(fragments: I) -> String
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    fragments
        .into_iter()
        .map(|fragment| fragment.as_ref().trim().to_string())
        .collect::<Vec<String>>()
        .join("\n")
}

/// Concatenated descendant text of an element, trimmed.
pub(crate) fn element_text(element: ElementRef<'_>) -> String {
    element.text().collect::<String>().trim().to_string()
}
