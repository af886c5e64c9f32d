//! Shared file utility functions

/// Video file extensions (lowercase)
pub const VIDEO_EXTENSIONS: &[&str] = &[
    ".mkv", ".mp4", ".avi", ".mov", ".wmv", ".flv", ".webm", ".m4v", ".ts", ".m2ts", ".mpg",
    ".mpeg",
];

/// Check if a file is a video file based on extension
pub fn is_video_file(path: &str) -> bool {
    let lower = path.to_lowercase();
    VIDEO_EXTENSIONS.iter().any(|ext| lower.ends_with(ext))
}

/// Sanitize a string for use as a file or folder name.
///
/// Uses the `sanitize_filename` crate which handles invalid characters for
/// the current OS, reserved filenames, and leading/trailing dots.
pub fn sanitize_for_filename(name: &str) -> String {
    sanitize_filename::sanitize(name)
}

/// The file extension with its leading dot, or an empty string.
pub fn extension_suffix(file_name: &str) -> String {
    std::path::Path::new(file_name)
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| format!(".{e}"))
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_video_file() {
        assert!(is_video_file("movie.mkv"));
        assert!(is_video_file("/path/to/video.MP4"));
        assert!(!is_video_file("music.mp3"));
        assert!(!is_video_file("notes.txt"));
    }

    #[test]
    fn test_sanitize_keeps_library_naming() {
        assert_eq!(
            sanitize_for_filename("Some Show (2021) {tmdb-555}"),
            "Some Show (2021) {tmdb-555}"
        );
        assert_eq!(sanitize_for_filename("AC/DC Live"), "ACDC Live");
    }

    #[test]
    fn test_extension_suffix() {
        assert_eq!(extension_suffix("a.b.mkv"), ".mkv");
        assert_eq!(extension_suffix("noext"), "");
    }
}
