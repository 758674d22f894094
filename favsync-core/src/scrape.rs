/// Returns the `href` of the first `<link>` tag whose `rel` is `icon` or
/// `shortcut icon`. Tag and attribute names match case-insensitively and
/// attributes may appear in any order.
pub fn find_icon_href(html: &str) -> Option<String> {
    let lower = html.to_ascii_lowercase();
    let mut cursor = 0;
    while let Some(offset) = lower[cursor..].find("<link") {
        let start = cursor + offset + "<link".len();
        let Some(next) = lower[start..].chars().next() else {
            return None;
        };
        if !(next.is_ascii_whitespace() || next == '/' || next == '>') {
            cursor = start;
            continue;
        }
        let end = lower[start..]
            .find('>')
            .map(|pos| start + pos)
            .unwrap_or(lower.len());
        let attrs = parse_attributes(&html[start..end]);
        let rel = attrs
            .iter()
            .find(|(name, _)| name == "rel")
            .map(|(_, value)| normalize_rel(value));
        if matches!(rel.as_deref(), Some("icon" | "shortcut icon"))
            && let Some((_, href)) = attrs.iter().find(|(name, _)| name == "href")
        {
            let href = href.trim();
            if !href.is_empty() {
                return Some(href.to_string());
            }
        }
        cursor = end;
    }
    None
}

fn normalize_rel(value: &str) -> String {
    value
        .split_ascii_whitespace()
        .map(|part| part.to_ascii_lowercase())
        .collect::<Vec<_>>()
        .join(" ")
}

// Attribute values keep their original case; names are lowercased.
fn parse_attributes(tag: &str) -> Vec<(String, String)> {
    let bytes = tag.as_bytes();
    let mut attrs = Vec::new();
    let mut i = 0;
    while i < bytes.len() {
        while i < bytes.len() && (bytes[i].is_ascii_whitespace() || bytes[i] == b'/') {
            i += 1;
        }
        let name_start = i;
        while i < bytes.len()
            && !bytes[i].is_ascii_whitespace()
            && bytes[i] != b'='
            && bytes[i] != b'/'
        {
            i += 1;
        }
        if name_start == i {
            break;
        }
        let name = tag[name_start..i].to_ascii_lowercase();
        while i < bytes.len() && bytes[i].is_ascii_whitespace() {
            i += 1;
        }
        if i >= bytes.len() || bytes[i] != b'=' {
            attrs.push((name, String::new()));
            continue;
        }
        i += 1;
        while i < bytes.len() && bytes[i].is_ascii_whitespace() {
            i += 1;
        }
        let value = match bytes.get(i) {
            Some(&quote @ (b'"' | b'\'')) => {
                let value_start = i + 1;
                let value_end = tag[value_start..]
                    .find(quote as char)
                    .map(|pos| value_start + pos)
                    .unwrap_or(bytes.len());
                i = (value_end + 1).min(bytes.len());
                &tag[value_start..value_end]
            }
            _ => {
                let value_start = i;
                while i < bytes.len() && !bytes[i].is_ascii_whitespace() {
                    i += 1;
                }
                &tag[value_start..i]
            }
        };
        attrs.push((name, value.to_string()));
    }
    attrs
}
