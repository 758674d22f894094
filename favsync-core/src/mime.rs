pub const ICON_EXTENSIONS: [&str; 5] = ["ico", "png", "jpg", "svg", "webp"];

/// Maps a response content type to the file extension the icon is stored under.
/// Unknown or missing types fall back to `ico`.
pub fn extension_for(content_type: Option<&str>) -> &'static str {
    let Some(content_type) = content_type else {
        return "ico";
    };
    let essence = content_type
        .split(';')
        .next()
        .unwrap_or_default()
        .trim()
        .to_ascii_lowercase();
    match essence.as_str() {
        "image/png" => "png",
        "image/jpeg" | "image/jpg" => "jpg",
        "image/svg+xml" => "svg",
        "image/webp" => "webp",
        "image/x-icon" | "image/vnd.microsoft.icon" => "ico",
        _ => "ico",
    }
}
