use url::Url;

const FALLBACK_TITLE: &str = "video";

/// Derives an output title from the playlist URL: the last path segment without
/// its extension, or the parent directory name when that segment is a generic
/// `index`/`playlist`/`master` name.
pub fn title_from_url(url_str: &str) -> String {
    let Ok(url) = Url::parse(url_str) else {
        return FALLBACK_TITLE.to_string();
    };

    let segments: Vec<&str> = url
        .path_segments()
        .map(|s| s.filter(|part| !part.is_empty()).collect())
        .unwrap_or_default();

    match segments.as_slice() {
        [.., parent, last] if is_generic(file_stem(last)) => parent.to_string(),
        [.., last] => file_stem(last).to_string(),
        [] => url.host_str().unwrap_or(FALLBACK_TITLE).to_string(),
    }
}

fn file_stem(name: &str) -> &str {
    match name.rfind('.') {
        Some(pos) if pos > 0 => &name[..pos],
        _ => name,
    }
}

fn is_generic(stem: &str) -> bool {
    matches!(
        stem.to_ascii_lowercase().as_str(),
        "index" | "playlist" | "master" | "prog_index"
    )
}
