use crate::types::ItemRef;
use std::fmt::Write;

/// Renders the message announcing `items` for one source.
///
/// Lines are numbered from 1 in the order the items appeared on the page;
/// links use Markdown so chat clients render them as `Link`.
pub fn format_digest(source_id: &str, items: &[ItemRef]) -> String {
    let mut digest = format!("Source #{}\n\n", source_id);

    for (number, item) in items.iter().enumerate() {
        let id = item
            .id
            .as_ref()
            .map(|id| id.to_string())
            .unwrap_or_else(|| "?".to_string());
        let _ = writeln!(digest, "{} id - {}\t[Link]({})", number + 1, id, item.link);
    }

    digest
}
