//! Page server (C9): resolves one page of one archive to HTTP bytes,
//! with conditional revalidation and an optional server-side downscale.

use std::io::Cursor;

use axum::http::{header, HeaderMap, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use image::imageops::FilterType;
use image::ImageFormat as CodecFormat;
use sha1::{Digest, Sha1};

use manga_archive::ArchiveReader;
use manga_core::model::File;
use manga_core::settings::Settings;

use crate::error::AppError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    Auto,
    Jpeg,
    Png,
    WebP,
}

impl OutputFormat {
    fn from_setting(s: &str) -> Self {
        match s {
            "jpeg" => OutputFormat::Jpeg,
            "png" => OutputFormat::Png,
            "webp" => OutputFormat::WebP,
            _ => OutputFormat::Auto,
        }
    }

    fn mime(self) -> &'static str {
        match self {
            OutputFormat::Auto | OutputFormat::Jpeg => "image/jpeg",
            OutputFormat::Png => "image/png",
            OutputFormat::WebP => "image/webp",
        }
    }
}

fn resample_from_setting(s: &str) -> FilterType {
    match s {
        "nearest" => FilterType::Nearest,
        "triangle" => FilterType::Triangle,
        _ => FilterType::Lanczos3,
    }
}

/// Rendering knobs read from settings, overridable per-request by query
/// parameters the HTTP layer parses before calling in.
#[derive(Debug, Clone, Copy)]
pub struct RenderOptions {
    pub max_side_px: u32,
    pub format: OutputFormat,
    pub quality: u8,
    pub resample: FilterType,
}

pub fn render_options_from_settings(settings: &Settings) -> RenderOptions {
    RenderOptions {
        max_side_px: settings.get_int("ui.reader.image.max_side_px").unwrap_or(0) as u32,
        format: OutputFormat::from_setting(&settings.get("ui.reader.image.render.format").unwrap_or_default()),
        quality: settings.get_int("ui.reader.image.render.quality").unwrap_or(85) as u8,
        resample: resample_from_setting(&settings.get("ui.reader.image.render.resample").unwrap_or_default()),
    }
}

/// Weak entity tag: `W/"sha1(file_sig || page || entry_name || entry_size || render_params)"`.
fn compute_etag(file_sig: &str, page: i32, entry_name: &str, entry_size: u64, render_params: &str) -> String {
    let mut hasher = Sha1::new();
    hasher.update(file_sig.as_bytes());
    hasher.update(page.to_le_bytes());
    hasher.update(entry_name.as_bytes());
    hasher.update(entry_size.to_le_bytes());
    hasher.update(render_params.as_bytes());
    format!("W/\"{}\"", hex::encode(hasher.finalize()))
}

fn file_sig(file: &File) -> String {
    format!("{}:{}:{}", file.id, file.mtime, file.size_bytes)
}

fn cache_control_header(settings: &Settings) -> HeaderValue {
    let enabled = settings.get_bool("ui.reader.image.cache.enabled").unwrap_or(true);
    if !enabled {
        return HeaderValue::from_static("no-store");
    }
    let max_age = settings.get_int("ui.reader.image.cache.max_age_s").unwrap_or(86_400);
    let immutable = settings.get_bool("ui.reader.image.cache.immutable").unwrap_or(false);
    let value = if immutable {
        format!("private, max-age={max_age}, immutable")
    } else {
        format!("private, max-age={max_age}")
    };
    HeaderValue::from_str(&value).unwrap_or_else(|_| HeaderValue::from_static("no-store"))
}

/// Serve one page, honoring `If-None-Match` and, when requested, a
/// server-side downscale. Falls back to streaming the original entry
/// on any decode/render failure.
pub fn serve_page(
    archive: &ArchiveReader,
    settings: &Settings,
    file: &File,
    page: i32,
    request_headers: &HeaderMap,
    options: RenderOptions,
) -> Result<Response, AppError> {
    if file.is_missing {
        return Err(AppError::NotFound("file is missing from disk".into()));
    }
    let clamped_page = file.clamp_page(page);
    if clamped_page != page {
        return Err(AppError::BadRequest(format!("page {page} out of range (0..{})", file.total_pages)));
    }

    let path = std::path::Path::new(&file.path);
    let entry = archive.entry(path, clamped_page as usize)?;
    let entry_size = archive.size(path, &entry)?;

    let render_params = format!("{:?}:{}:{:?}", options.format, options.max_side_px, options.resample as u32);
    let etag = compute_etag(&file_sig(file), clamped_page, &entry.name, entry_size, &render_params);

    if let Some(if_none_match) = request_headers.get(header::IF_NONE_MATCH).and_then(|v| v.to_str().ok()) {
        if if_none_match == etag {
            let mut resp = StatusCode::NOT_MODIFIED.into_response();
            resp.headers_mut().insert(header::ETAG, HeaderValue::from_str(&etag).unwrap());
            resp.headers_mut().insert(header::CACHE_CONTROL, cache_control_header(settings));
            return Ok(resp);
        }
    }

    let cache_control = cache_control_header(settings);

    if options.max_side_px > 0 {
        if let Ok(bytes) = archive.read_whole(path, &entry) {
            if let Some(resp) = try_render_downscaled(&bytes, &etag, &cache_control, options) {
                return Ok(resp);
            }
        }
    }

    let mime = archive.guess_mime(&entry.name);
    let chunk_kb = settings.get_int("reader.stream.chunk_kb").unwrap_or(512).max(1) as usize;
    let chunks = archive.stream(path, &entry, chunk_kb * 1024)?;
    let body_bytes: Vec<u8> = chunks.into_iter().flatten().collect();

    let mut resp = body_bytes.into_response();
    resp.headers_mut().insert(header::CONTENT_TYPE, HeaderValue::from_str(mime).unwrap());
    resp.headers_mut().insert(header::CONTENT_LENGTH, HeaderValue::from_str(&entry_size.to_string()).unwrap());
    resp.headers_mut().insert(header::ETAG, HeaderValue::from_str(&etag).unwrap());
    resp.headers_mut().insert(header::CACHE_CONTROL, cache_control);
    Ok(resp)
}

fn try_render_downscaled(bytes: &[u8], etag: &str, cache_control: &HeaderValue, options: RenderOptions) -> Option<Response> {
    let img = image::load_from_memory(bytes).ok()?;
    if img.width().max(img.height()) <= options.max_side_px {
        return None;
    }
    let resized = img.resize(options.max_side_px, options.max_side_px, options.resample);

    let mut buf = Vec::new();
    let (mime, encode_result): (&str, image::ImageResult<()>) = match options.format {
        OutputFormat::Png => ("image/png", resized.write_to(&mut Cursor::new(&mut buf), CodecFormat::Png)),
        OutputFormat::WebP => ("image/webp", encode_webp_quality(&resized, options.quality, &mut buf)),
        OutputFormat::Auto | OutputFormat::Jpeg => {
            ("image/jpeg", resized.write_to(&mut Cursor::new(&mut buf), CodecFormat::Jpeg))
        }
    };
    encode_result.ok()?;

    let mut resp = buf.into_response();
    resp.headers_mut().insert(header::CONTENT_TYPE, HeaderValue::from_str(mime).ok()?);
    resp.headers_mut().insert(header::ETAG, HeaderValue::from_str(etag).ok()?);
    resp.headers_mut().insert(header::CACHE_CONTROL, cache_control.clone());
    Some(resp)
}

fn encode_webp_quality(img: &image::DynamicImage, quality: u8, buf: &mut Vec<u8>) -> image::ImageResult<()> {
    let rgba = img.to_rgba8();
    let encoder = webp::Encoder::from_rgba(&rgba, rgba.width(), rgba.height());
    let encoded = encoder.encode(quality as f32);
    buf.extend_from_slice(&encoded);
    Ok(())
}

/// Serve a cached cover from its derived on-disk path. A missing cache
/// file is reported as `NotFound`, not regenerated inline — generation
/// only happens during a scan's cover phase.
pub fn serve_cover(cache_path: &std::path::Path) -> Result<Response, AppError> {
    if !cache_path.exists() {
        return Err(AppError::NotFound("cover not cached".into()));
    }
    let bytes = std::fs::read(cache_path)?;
    let mut resp = bytes.into_response();
    resp.headers_mut().insert(header::CONTENT_TYPE, HeaderValue::from_static("image/webp"));
    resp.headers_mut()
        .insert(header::CACHE_CONTROL, HeaderValue::from_static("public, max-age=31536000, immutable"));
    Ok(resp)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn etag_changes_with_any_input() {
        let a = compute_etag("sig", 0, "page1.jpg", 100, "params");
        let b = compute_etag("sig", 1, "page1.jpg", 100, "params");
        assert_ne!(a, b);
    }

    #[test]
    fn etag_is_deterministic() {
        let a = compute_etag("sig", 0, "page1.jpg", 100, "params");
        let b = compute_etag("sig", 0, "page1.jpg", 100, "params");
        assert_eq!(a, b);
    }

    #[test]
    fn output_format_maps_mime_types() {
        assert_eq!(OutputFormat::Jpeg.mime(), "image/jpeg");
        assert_eq!(OutputFormat::Png.mime(), "image/png");
        assert_eq!(OutputFormat::WebP.mime(), "image/webp");
    }
}
