//! Media type inference from locator extensions

use serde::Serialize;

/// Declared media type of a locator
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct MediaType {
    pub mime: &'static str,
    /// A typical browser decoder plays this container inline
    pub inline_playable: bool,
}

const OPAQUE: MediaType = MediaType {
    mime: "application/octet-stream",
    inline_playable: false,
};

/// Infer the media type of `locator` from its file extension
///
/// Query strings and fragments are ignored, so signed URLs resolve the same
/// as plain paths. Unknown or missing extensions yield an opaque binary type.
pub fn infer_media_type(locator: &str) -> MediaType {
    let path = locator
        .split(['?', '#'])
        .next()
        .unwrap_or_default();
    let file_name = path.rsplit('/').next().unwrap_or_default();

    let Some((_, ext)) = file_name.rsplit_once('.') else {
        return OPAQUE;
    };

    let (mime, inline_playable) = match ext.to_ascii_lowercase().as_str() {
        "mp4" | "m4v" => ("video/mp4", true),
        "webm" => ("video/webm", true),
        "ogv" | "ogg" => ("video/ogg", true),
        "mov" => ("video/quicktime", false),
        "avi" => ("video/x-msvideo", false),
        "mkv" => ("video/x-matroska", false),
        "3gp" => ("video/3gpp", false),
        _ => return OPAQUE,
    };

    MediaType {
        mime,
        inline_playable,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_playable_containers() {
        assert_eq!(infer_media_type("/videos/p1/walk.mp4").mime, "video/mp4");
        assert!(infer_media_type("walk.MP4").inline_playable);
        assert!(infer_media_type("https://cdn/x/clip.webm").inline_playable);
        assert!(infer_media_type("clip.ogv").inline_playable);
    }

    #[test]
    fn test_known_but_not_inline() {
        let mov = infer_media_type("clip.mov");
        assert_eq!(mov.mime, "video/quicktime");
        assert!(!mov.inline_playable);
    }

    #[test]
    fn test_query_and_fragment_ignored() {
        let m = infer_media_type("https://store/clip.mp4?sig=abc.def&exp=1#t=10");
        assert_eq!(m.mime, "video/mp4");
    }

    #[test]
    fn test_unknown_defaults_to_opaque() {
        assert_eq!(infer_media_type("blob-1234"), OPAQUE);
        assert_eq!(infer_media_type("https://host.example/stream"), OPAQUE);
        assert_eq!(infer_media_type("notes.txt"), OPAQUE);
    }
}
