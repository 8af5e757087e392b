// naming.rs — 文件命名与磁盘布局
// <download_dir>/<category>/<sanitized_title>[_<W>x<H>].<ext>

use crate::source::Candidate;
use std::path::{Path, PathBuf};

/// 文件名中不允许出现的字符
const INVALID_CHARS: &[char] = &['<', '>', ':', '"', '/', '\\', '|', '?', '*'];

/// 多数文件系统的文件名长度上限（字节）
const MAX_FILENAME_BYTES: usize = 255;

const FALLBACK_NAME: &str = "wallpaper";
const FALLBACK_EXT: &str = ".jpg";

/// 将任意字符串清洗为合法文件名
///
/// 非法字符替换为 `_`，去掉首尾空白和点号，超长时截断（保留扩展名），
/// 清洗后为空则使用 `wallpaper`。
pub fn sanitize_filename(name: &str) -> String {
    let replaced: String = name
        .chars()
        .map(|c| {
            if INVALID_CHARS.contains(&c) || c.is_control() {
                '_'
            } else {
                c
            }
        })
        .collect();

    let trimmed = replaced.trim().trim_matches('.').trim();
    let mut result = trimmed.to_string();

    if result.len() > MAX_FILENAME_BYTES {
        let (base, ext) = match result.rfind('.') {
            Some(idx) if idx > 0 && result.len() - idx <= 16 => {
                (&result[..idx], &result[idx..])
            }
            _ => (result.as_str(), ""),
        };
        let base = truncate_at_char_boundary(base, MAX_FILENAME_BYTES - ext.len());
        result = format!("{base}{ext}");
    }

    if result.is_empty() {
        FALLBACK_NAME.to_string()
    } else {
        result
    }
}

fn truncate_at_char_boundary(s: &str, max_bytes: usize) -> &str {
    if s.len() <= max_bytes {
        return s;
    }
    let mut end = max_bytes;
    while !s.is_char_boundary(end) {
        end -= 1;
    }
    &s[..end]
}

/// 从 URL 中提取扩展名（带点号），忽略查询串和片段；没有则返回空串
pub fn extension_from_url(url: &str) -> &str {
    let path = url.split(['?', '#']).next().unwrap_or(url);
    // 去掉协议和主机部分，只看最后一段路径
    let after_scheme = path.split_once("://").map(|(_, rest)| rest).unwrap_or(path);
    let last_segment = match after_scheme.split_once('/') {
        Some((_, p)) => p.rsplit('/').next().unwrap_or(""),
        None => "",
    };

    match last_segment.rfind('.') {
        Some(idx) if idx > 0 && idx + 1 < last_segment.len() => &last_segment[idx..],
        _ => "",
    }
}

/// 计算某个候选项在磁盘上的目标路径
pub fn destination_for(download_dir: &Path, candidate: &Candidate, url: &str) -> PathBuf {
    let category = sanitize_filename(&candidate.category);

    let mut stem = candidate.title.clone();
    if let (Some(w), Some(h)) = (candidate.width, candidate.height) {
        if w > 0 && h > 0 {
            stem.push_str(&format!("_{w}x{h}"));
        }
    }

    let ext = match extension_from_url(url) {
        "" => FALLBACK_EXT,
        ext => ext,
    };

    let stem = sanitize_filename(&stem);
    download_dir
        .join(category)
        .join(sanitize_filename(&format!("{stem}{ext}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::{Quality, RankedUrl};

    #[test]
    fn replaces_invalid_characters() {
        assert_eq!(sanitize_filename("test<>:\"/\\|?*file.jpg"), "test_________file.jpg");
    }

    #[test]
    fn trims_whitespace_and_dots() {
        assert_eq!(sanitize_filename("  ..sunset..  "), "sunset");
    }

    #[test]
    fn empty_name_falls_back() {
        assert_eq!(sanitize_filename(""), "wallpaper");
        assert_eq!(sanitize_filename(" ... "), "wallpaper");
    }

    #[test]
    fn long_names_keep_extension() {
        let long = format!("{}.png", "é".repeat(300));
        let sanitized = sanitize_filename(&long);
        assert!(sanitized.len() <= 255);
        assert!(sanitized.ends_with(".png"));
    }

    #[test]
    fn extension_ignores_query_string() {
        assert_eq!(extension_from_url("https://example.com/wallpaper.jpg?size=large"), ".jpg");
        assert_eq!(
            extension_from_url("https://w.wallhaven.cc/full/94/wallhaven-94x38z.png"),
            ".png"
        );
        assert_eq!(extension_from_url("https://images.unsplash.com/photo-123?ixid=a.b"), "");
        assert_eq!(extension_from_url("https://example.com"), "");
    }

    #[test]
    fn destination_follows_layout() {
        let candidate = Candidate {
            id: "abc".into(),
            title: "mountain lake".into(),
            urls: vec![RankedUrl::new(Quality::Full, Some("https://x/y.png".into()))],
            category: "nature/landscape".into(),
            width: Some(1920),
            height: Some(1080),
            tags: vec![],
            source: "test",
            page_url: None,
            extra: None,
        };
        let path = destination_for(Path::new("/tmp/walls"), &candidate, "https://x/y.png");
        assert_eq!(
            path,
            Path::new("/tmp/walls/nature_landscape/mountain lake_1920x1080.png")
        );

        let no_dims = Candidate {
            width: None,
            ..candidate
        };
        let path = destination_for(Path::new("/tmp/walls"), &no_dims, "https://x/photo");
        assert_eq!(path, Path::new("/tmp/walls/nature_landscape/mountain lake.jpg"));
    }
}
