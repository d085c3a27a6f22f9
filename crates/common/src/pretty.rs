use crate::{Uid, uid_offset, uid_page};
use tabled::{Table, Tabled, builder::Builder, settings};

/// Predefined output styles that map to `tabled` styles.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub enum TableStyleKind {
    #[default]
    Modern,
    Ascii,
    Plain,
}

impl TableStyleKind {
    fn apply(self, table: &mut Table) {
        match self {
            Self::Modern => table.with(settings::Style::modern()),
            Self::Ascii => table.with(settings::Style::ascii()),
            Self::Plain => table.with(settings::Style::empty()),
        };
    }
}

/// Render string rows under `headers`. Renders `<empty>` when there is nothing
/// to show at all.
pub fn render_string_table<I>(headers: &[&str], rows: I, style: TableStyleKind) -> String
where
    I: IntoIterator<Item = Vec<String>>,
{
    let rows: Vec<Vec<String>> = rows.into_iter().collect();
    if headers.is_empty() && rows.is_empty() {
        return "<empty>".into();
    }

    let mut builder = Builder::default();
    if !headers.is_empty() {
        builder.push_record(headers.iter().copied());
    }
    rows.into_iter().for_each(|row| builder.push_record(row));
    let mut table = builder.build();
    style.apply(&mut table);
    table.to_string()
}

/// Render any `Tabled` rows with the provided style.
pub fn render_structured_rows<T>(rows: &[T], style: TableStyleKind) -> String
where
    T: Tabled + Clone,
{
    if rows.is_empty() {
        return "<empty>".into();
    }

    let mut table = Table::new(rows.to_vec());
    style.apply(&mut table);
    table.to_string()
}

/// Format a uid as `(page, offset)`.
pub fn format_uid(uid: Uid) -> String {
    format!("({}, {})", uid_page(uid), uid_offset(uid))
}

/// Hex preview of a byte slice, truncated to `max` bytes.
pub fn format_bytes(bytes: &[u8], max: usize) -> String {
    let shown: Vec<String> = bytes.iter().take(max).map(|b| format!("{b:02x}")).collect();
    let mut out = shown.join(" ");
    if bytes.len() > max {
        out.push_str(&format!(" .. (+{} bytes)", bytes.len() - max));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::uid_from;

    #[test]
    fn string_table_renders_headers() {
        let rendered = render_string_table(
            &["Idx", "Op"],
            vec![vec!["0".into(), "INSERT".into()]],
            TableStyleKind::Modern,
        );
        assert!(rendered.contains("Idx"));
        assert!(rendered.contains("INSERT"));
    }

    #[test]
    fn empty_tables_render_placeholder() {
        assert_eq!(
            render_string_table(&[], vec![], TableStyleKind::Plain),
            "<empty>"
        );
    }

    #[test]
    fn uid_and_bytes_formatting() {
        assert_eq!(format_uid(uid_from(4, 300)), "(4, 300)");
        assert_eq!(format_bytes(&[0x06, 0x00, 0x02], 8), "06 00 02");
        assert_eq!(format_bytes(&[1, 2, 3, 4], 2), "01 02 .. (+2 bytes)");
    }
}
