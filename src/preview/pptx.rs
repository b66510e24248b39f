//! Presentation previews: first slide → PNG wireframe.
//!
//! There is no slide renderer to bind to, so the preview is drawn from the
//! slide's own geometry: background colour, filled shapes, embedded raster
//! pictures at their frames, and each text paragraph as a grey bar whose
//! length follows the text. At thumbnail size this reads as the slide's
//! layout, which is what the preview is for.
//!
//! Only `ppt/presentation.xml`, its relationships, the first slide and the
//! pictures that slide references are read. Other slides are never opened.

use super::package::{self, attr, Package};
use super::{encode, PreviewArtifact, PreviewOptions, RenderedImage};
use crate::error::PreviewError;
use crate::format::DocumentFormat;
use image::imageops::{self, FilterType};
use image::{DynamicImage, Rgba, RgbaImage};
use once_cell::sync::Lazy;
use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;
use regex::Regex;
use std::io::Cursor;
use tracing::{debug, warn};

const PRESENTATION_PART: &str = "ppt/presentation.xml";

/// 10in x 7.5in, the PresentationML default slide size.
const DEFAULT_SLIDE_SIZE: (i64, i64) = (9_144_000, 6_858_000);

const WHITE: Rgba<u8> = Rgba([255, 255, 255, 255]);
const TEXT_BAR: Rgba<u8> = Rgba([64, 64, 64, 255]);
const PICTURE_PLACEHOLDER: Rgba<u8> = Rgba([200, 200, 200, 255]);

/// Frames are drawn clipped to the canvas; this only keeps offsets finite.
const FRAME_LIMIT_PX: i64 = 1 << 24;

/// Decoder allocation cap for embedded pictures.
const PICTURE_MAX_ALLOC: u64 = 64 * 1024 * 1024;

#[derive(Debug)]
struct Deck {
    size: (i64, i64),
    first_slide_rel: Option<String>,
    slide_count: usize,
}

#[derive(Debug, Default, Clone, Copy)]
struct Frame {
    x: i64,
    y: i64,
    cx: i64,
    cy: i64,
}

#[derive(Debug, Default)]
struct Shape {
    frame: Option<Frame>,
    fill: Option<Rgba<u8>>,
    picture: Option<String>,
    lines: Vec<String>,
}

#[derive(Debug, Default)]
struct Slide {
    background: Option<Rgba<u8>>,
    shapes: Vec<Shape>,
}

/// Build the first-slide image artifact for a `.pptx` upload.
pub fn render_first_slide(bytes: &[u8], options: &PreviewOptions) -> Result<PreviewArtifact, PreviewError> {
    let limit = options.max_part_bytes;
    let mut archive = package::open(bytes)?;

    let deck = parse_presentation(&package::read_part(&mut archive, PRESENTATION_PART, limit)?)?;
    let slide_path = first_slide_path(&mut archive, &deck, limit)?;
    debug!("First slide: {} ({} slides in deck)", slide_path, deck.slide_count.max(1));

    let slide = parse_slide(&package::read_part(&mut archive, &slide_path, limit)?)?;
    let rels = package::read_relationships(&mut archive, &slide_path, limit)?;

    let canvas = rasterise(&slide, deck.size, options, |rel_id| {
        let target = rels.get(rel_id)?;
        match package::read_part_bytes(&mut archive, target, limit) {
            Ok(data) => Some(data),
            Err(e) => {
                warn!("Slide picture {} unreadable: {}", target, e);
                None
            }
        }
    });

    let (width, height) = canvas.dimensions();
    let image = DynamicImage::ImageRgba8(canvas);
    Ok(PreviewArtifact::Image(RenderedImage {
        format: DocumentFormat::Presentation,
        png: encode::encode_png(&image)?,
        width,
        height,
        page_count: deck.slide_count.max(1),
    }))
}

fn xml_error(part: &str, e: quick_xml::Error) -> PreviewError {
    PreviewError::decode(format!("malformed {part}: {e}"))
}

fn parse_presentation(xml: &str) -> Result<Deck, PreviewError> {
    let mut reader = Reader::from_str(xml);
    let mut deck = Deck {
        size: DEFAULT_SLIDE_SIZE,
        first_slide_rel: None,
        slide_count: 0,
    };
    loop {
        match reader.read_event().map_err(|e| xml_error(PRESENTATION_PART, e))? {
            Event::Start(e) | Event::Empty(e) => match e.local_name().as_ref() {
                b"sldSz" => {
                    if let (Some(cx), Some(cy)) = (emu(&e, b"cx"), emu(&e, b"cy")) {
                        if cx > 0 && cy > 0 {
                            deck.size = (cx, cy);
                        }
                    }
                }
                b"sldId" => {
                    deck.slide_count += 1;
                    if deck.first_slide_rel.is_none() {
                        deck.first_slide_rel = attr(&e, b"r:id");
                    }
                }
                _ => {}
            },
            Event::Eof => break,
            _ => {}
        }
    }
    Ok(deck)
}

static RE_SLIDE_PART: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^ppt/slides/slide(\d+)\.xml$").unwrap());

/// Follow the first `sldId` through the presentation relationships; when the
/// deck does not list its slides, take the lowest-numbered slide part.
fn first_slide_path(archive: &mut Package<'_>, deck: &Deck, limit: u64) -> Result<String, PreviewError> {
    if let Some(ref rel_id) = deck.first_slide_rel {
        let rels = package::read_relationships(archive, PRESENTATION_PART, limit)?;
        if let Some(target) = rels.get(rel_id) {
            if archive.index_for_name(target).is_some() {
                return Ok(target.clone());
            }
            warn!("Slide relationship {} points at missing part {}", rel_id, target);
        }
    }

    archive
        .file_names()
        .filter_map(|name| {
            RE_SLIDE_PART
                .captures(name)
                .and_then(|c| c[1].parse::<u32>().ok())
                .map(|n| (n, name.to_string()))
        })
        .min_by_key(|(n, _)| *n)
        .map(|(_, name)| name)
        .ok_or_else(|| PreviewError::corrupt("presentation has no slides"))
}

fn emu(e: &BytesStart<'_>, key: &[u8]) -> Option<i64> {
    attr(e, key).and_then(|v| v.trim().parse().ok())
}

fn parse_colour(hex: &str) -> Option<Rgba<u8>> {
    if hex.len() != 6 {
        return None;
    }
    let v = u32::from_str_radix(hex, 16).ok()?;
    Some(Rgba([(v >> 16) as u8, (v >> 8) as u8, v as u8, 255]))
}

fn within(stack: &[Vec<u8>], name: &[u8]) -> bool {
    stack.iter().any(|s| s.as_slice() == name)
}

fn top_is(stack: &[Vec<u8>], name: &[u8]) -> bool {
    stack.last().is_some_and(|s| s.as_slice() == name)
}

fn parse_slide(xml: &str) -> Result<Slide, PreviewError> {
    let mut reader = Reader::from_str(xml);
    let mut slide = Slide::default();
    let mut stack: Vec<Vec<u8>> = Vec::new();
    let mut shape: Option<Shape> = None;
    let mut line = String::new();


    loop {
        let event = reader.read_event().map_err(|e| xml_error("slide", e))?;
        match event {
            Event::Start(ref e) | Event::Empty(ref e) => {
                let name = e.local_name().as_ref().to_vec();
                match name.as_slice() {
                    b"sp" | b"pic" if matches!(event, Event::Start(_)) => {
                        shape = Some(Shape::default());
                    }
                    b"off" if within(&stack, b"xfrm") => {
                        if let Some(s) = shape.as_mut() {
                            let f = s.frame.get_or_insert_with(Frame::default);
                            f.x = emu(e, b"x").unwrap_or(0);
                            f.y = emu(e, b"y").unwrap_or(0);
                        }
                    }
                    b"ext" if within(&stack, b"xfrm") => {
                        if let Some(s) = shape.as_mut() {
                            let f = s.frame.get_or_insert_with(Frame::default);
                            f.cx = emu(e, b"cx").unwrap_or(0);
                            f.cy = emu(e, b"cy").unwrap_or(0);
                        }
                    }
                    b"srgbClr" if top_is(&stack, b"solidFill") && !within(&stack, b"ln") => {
                        let colour = attr(e, b"val").and_then(|v| parse_colour(&v));
                        if within(&stack, b"bg") {
                            slide.background = colour.or(slide.background);
                        } else if within(&stack, b"spPr") {
                            if let Some(s) = shape.as_mut() {
                                s.fill = colour;
                            }
                        }
                    }
                    b"blip" => {
                        if let Some(s) = shape.as_mut() {
                            s.picture = attr(e, b"r:embed");
                        }
                    }
                    _ => {}
                }
                if matches!(event, Event::Start(_)) {
                    stack.push(name);
                }
            }
            Event::Text(ref t) if top_is(&stack, b"t") => {
                if shape.is_some() {
                    let text = t.unescape().map_err(|e| xml_error("slide", e))?;
                    line.push_str(&text);
                }
            }
            Event::End(_) => {
                let name = stack.pop().unwrap_or_default();
                match name.as_slice() {
                    b"p" if within(&stack, b"txBody") => {
                        if let Some(s) = shape.as_mut() {
                            let text = std::mem::take(&mut line);
                            if !text.trim().is_empty() {
                                s.lines.push(text);
                            }
                        }
                    }
                    b"sp" | b"pic" => {
                        if let Some(s) = shape.take() {
                            slide.shapes.push(s);
                        }
                    }
                    _ => {}
                }
            }
            Event::Eof => break,
            _ => {}
        }
    }
    Ok(slide)
}

/// Draw the slide at `options.width` pixels wide.
///
/// `load_picture` maps a relationship id to the picture's bytes.
fn rasterise<F>(slide: &Slide, size: (i64, i64), options: &PreviewOptions, mut load_picture: F) -> RgbaImage
where
    F: FnMut(&str) -> Option<Vec<u8>>,
{
    let (slide_cx, slide_cy) = size;
    let width = options.width.max(1);
    let scale = f64::from(width) / slide_cx as f64;
    let height = ((slide_cy as f64 * scale).round() as u32).clamp(1, options.max_height().max(1));

    let mut canvas = RgbaImage::from_pixel(width, height, slide.background.unwrap_or(WHITE));

    // Placeholders inherit their position from the layout, which we do not
    // read; stack them down the slide instead.
    let mut flow_y = (f64::from(height) * 0.08) as i64;

    for shape in &slide.shapes {
        let (x, y, w, h) = match shape.frame {
            Some(f) if f.cx > 0 && f.cy > 0 => (
                to_px(f.x as f64 * scale),
                to_px(f.y as f64 * scale),
                to_px((f.cx as f64 * scale).round()).max(1),
                to_px((f.cy as f64 * scale).round()).max(1),
            ),
            _ => {
                if shape.lines.is_empty() {
                    continue;
                }
                let h = (shape.lines.len() as i64 * 8).max(8);
                let rect = (i64::from(width) / 12, flow_y, i64::from(width) * 10 / 12, h);
                flow_y += h + 4;
                rect
            }
        };

        if let Some(fill) = shape.fill {
            fill_rect(&mut canvas, x, y, w, h, fill);
        }

        if let Some(ref rel_id) = shape.picture {
            let picture = load_picture(rel_id).and_then(|data| match decode_picture(&data) {
                Ok(img) => Some(img),
                Err(e) => {
                    warn!("Slide picture {} not decodable: {}", rel_id, e);
                    None
                }
            });
            match picture {
                Some(img) => draw_picture(&mut canvas, &img, x, y, w, h),
                None => fill_rect(&mut canvas, x, y, w, h, PICTURE_PLACEHOLDER),
            }
        }

        draw_text_bars(&mut canvas, &shape.lines, x, y, w, h);
    }

    canvas
}

fn decode_picture(data: &[u8]) -> image::ImageResult<DynamicImage> {
    let mut limits = image::Limits::default();
    limits.max_alloc = Some(PICTURE_MAX_ALLOC);
    let mut reader = image::ImageReader::new(Cursor::new(data))
        .with_guessed_format()
        .map_err(image::ImageError::IoError)?;
    reader.limits(limits);
    reader.decode()
}

/// Scale a slide coordinate to pixels, bounded so frame arithmetic cannot overflow.
fn to_px(v: f64) -> i64 {
    (v as i64).clamp(-FRAME_LIMIT_PX, FRAME_LIMIT_PX)
}

/// Draw `img` stretched over the frame, resampling only the part of the frame
/// that lands on the canvas.
fn draw_picture(canvas: &mut RgbaImage, img: &DynamicImage, x: i64, y: i64, w: i64, h: i64) {
    let (cw, ch) = (i64::from(canvas.width()), i64::from(canvas.height()));
    let (vx0, vy0) = (x.max(0), y.max(0));
    let (vx1, vy1) = ((x + w).min(cw), (y + h).min(ch));
    if vx1 <= vx0 || vy1 <= vy0 || img.width() == 0 || img.height() == 0 {
        return;
    }

    // Visible window in source pixels.
    let source_span = |from: i64, to: i64, origin: i64, extent: i64, size: u32| -> (u32, u32) {
        let size_f = f64::from(size);
        let start = ((from - origin) as f64 / extent as f64 * size_f).floor().clamp(0.0, size_f - 1.0) as u32;
        let end = ((to - origin) as f64 / extent as f64 * size_f).ceil().clamp(f64::from(start) + 1.0, size_f) as u32;
        (start, end - start)
    };
    let (sx, sw) = source_span(vx0, vx1, x, w, img.width());
    let (sy, sh) = source_span(vy0, vy1, y, h, img.height());

    let visible = img
        .crop_imm(sx, sy, sw, sh)
        .resize_exact((vx1 - vx0) as u32, (vy1 - vy0) as u32, FilterType::Triangle)
        .to_rgba8();
    imageops::overlay(canvas, &visible, vx0, vy0);
}

/// One bar per paragraph, as long as the text would be at this line height.
fn draw_text_bars(canvas: &mut RgbaImage, lines: &[String], x: i64, y: i64, w: i64, h: i64) {
    if lines.is_empty() {
        return;
    }
    let line_h = (h / (lines.len() as i64 + 1)).clamp(2, 10);
    let thickness = (line_h / 2).max(1);
    let pad = (line_h / 2).max(1);
    for (i, text) in lines.iter().enumerate() {
        let top = y + pad + i as i64 * line_h;
        if top + thickness > y + h {
            break;
        }
        let len = (text.chars().count() as i64 * line_h / 2).clamp(1, (w - 2 * pad).max(1));
        fill_rect(canvas, x + pad, top, len, thickness, TEXT_BAR);
    }
}

fn fill_rect(canvas: &mut RgbaImage, x: i64, y: i64, w: i64, h: i64, colour: Rgba<u8>) {
    let (cw, ch) = (i64::from(canvas.width()), i64::from(canvas.height()));
    let (x0, y0) = (x.clamp(0, cw), y.clamp(0, ch));
    let (x1, y1) = ((x + w).clamp(0, cw), (y + h).clamp(0, ch));
    for py in y0..y1 {
        for px in x0..x1 {
            canvas.put_pixel(px as u32, py as u32, colour);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::preview::package::fixtures::{self, presentation_parts, slide_xml, text_shape, zip_parts};

    fn render(bytes: &[u8]) -> RenderedImage {
        match render_first_slide(bytes, &PreviewOptions::default()).expect("render") {
            PreviewArtifact::Image(img) => img,
            other => panic!("expected image, got {other:?}"),
        }
    }

    fn decode(img: &RenderedImage) -> RgbaImage {
        image::load_from_memory(&img.png).unwrap().to_rgba8()
    }

    #[test]
    fn renders_at_preview_width_with_slide_aspect() {
        let img = render(&fixtures::pptx(&["Intro", "Second"]));
        assert_eq!(img.width, 200);
        assert_eq!(img.height, 150);
        assert_eq!(img.page_count, 2);
    }

    #[test]
    fn shape_fill_is_drawn_at_its_frame() {
        let img = decode(&render(&fixtures::pptx(&["Intro"])));
        // Frame starts at 0.5in → 10 px; inside the filled box but left of the text bar.
        assert_eq!(*img.get_pixel(12, 30), Rgba([0x1F, 0x4E, 0x79, 255]));
        // Outside every shape.
        assert_eq!(*img.get_pixel(5, 140), WHITE);
    }

    #[test]
    fn only_the_first_slide_is_read() {
        let first = slide_xml(&text_shape("Only me", 0, 0, 9_144_000, 6_858_000, Some("FF0000")));
        // A second slide that would fail to parse if it were touched.
        let parts = presentation_parts(vec![first, "<p:sld><broken".to_string()]);
        let borrowed: Vec<(&str, Vec<u8>)> = parts.iter().map(|(n, d)| (n.as_str(), d.clone())).collect();
        let img = decode(&render(&zip_parts(&borrowed)));
        assert_eq!(*img.get_pixel(199, 149), Rgba([255, 0, 0, 255]));
    }

    #[test]
    fn falls_back_to_lowest_numbered_slide_part() {
        let presentation = b"<p:presentation><p:sldSz cx=\"12192000\" cy=\"6096000\"/></p:presentation>".to_vec();
        let bytes = zip_parts(&[
            ("ppt/presentation.xml", presentation),
            ("ppt/slides/slide10.xml", b"<p:sld><oops".to_vec()),
            ("ppt/slides/slide2.xml", slide_xml("").into_bytes()),
        ]);
        let img = render(&bytes);
        assert_eq!(img.width, 200);
        assert_eq!(img.height, 100);
    }

    #[test]
    fn background_colour_fills_canvas() {
        let slide = "<p:sld xmlns:p=\"p\" xmlns:a=\"a\"><p:cSld><p:bg><p:bgPr><a:solidFill>\
                     <a:srgbClr val=\"00FF00\"/></a:solidFill></p:bgPr></p:bg><p:spTree/></p:cSld></p:sld>"
            .to_string();
        let parts = presentation_parts(vec![slide]);
        let borrowed: Vec<(&str, Vec<u8>)> = parts.iter().map(|(n, d)| (n.as_str(), d.clone())).collect();
        let img = decode(&render(&zip_parts(&borrowed)));
        assert_eq!(*img.get_pixel(100, 75), Rgba([0, 255, 0, 255]));
    }

    /// A deck whose only slide holds one picture: left half red, right half blue.
    fn deck_with_picture(x: i64, y: i64, cx: i64, cy: i64) -> Vec<u8> {
        let mut two_tone = RgbaImage::from_pixel(2, 2, Rgba([0, 0, 255, 255]));
        two_tone.put_pixel(0, 0, Rgba([255, 0, 0, 255]));
        two_tone.put_pixel(0, 1, Rgba([255, 0, 0, 255]));
        let mut png = Vec::new();
        DynamicImage::ImageRgba8(two_tone)
            .write_to(&mut Cursor::new(&mut png), image::ImageFormat::Png)
            .unwrap();
        let pic = format!(
            "<p:pic><p:blipFill><a:blip r:embed=\"rId5\"/></p:blipFill>\
             <p:spPr><a:xfrm><a:off x=\"{x}\" y=\"{y}\"/><a:ext cx=\"{cx}\" cy=\"{cy}\"/></a:xfrm></p:spPr></p:pic>"
        );
        let mut parts = presentation_parts(vec![slide_xml(&pic)]);
        parts.push((
            "ppt/slides/_rels/slide1.xml.rels".to_string(),
            b"<Relationships><Relationship Id=\"rId5\" Target=\"../media/image1.png\"/></Relationships>".to_vec(),
        ));
        parts.push(("ppt/media/image1.png".to_string(), png));
        let borrowed: Vec<(&str, Vec<u8>)> = parts.iter().map(|(n, d)| (n.as_str(), d.clone())).collect();
        zip_parts(&borrowed)
    }

    #[test]
    fn embedded_picture_is_scaled_into_frame() {
        let img = decode(&render(&deck_with_picture(0, 0, 4_572_000, 3_429_000)));
        assert_eq!(*img.get_pixel(10, 37), Rgba([255, 0, 0, 255]));
        assert_eq!(*img.get_pixel(90, 37), Rgba([0, 0, 255, 255]));
        assert_eq!(*img.get_pixel(150, 110), WHITE);
    }

    #[test]
    fn oversized_picture_frame_is_clipped_to_canvas() {
        // 200x the slide: only the picture's top-left corner is on the slide.
        let img = render(&deck_with_picture(0, 0, 1_828_800_000, 1_371_600_000));
        assert_eq!((img.width, img.height), (200, 150));
        let pixels = decode(&img);
        assert_eq!(*pixels.get_pixel(0, 0), Rgba([255, 0, 0, 255]));
        assert_eq!(*pixels.get_pixel(199, 149), Rgba([255, 0, 0, 255]));
    }

    #[test]
    fn picture_hanging_off_the_left_edge_shows_its_right_half() {
        let img = decode(&render(&deck_with_picture(-4_572_000, 0, 9_144_000, 6_858_000)));
        assert_eq!(*img.get_pixel(10, 75), Rgba([0, 0, 255, 255]));
        assert_eq!(*img.get_pixel(150, 75), WHITE);
    }

    #[test]
    fn frame_far_off_the_slide_draws_nothing() {
        let img = decode(&render(&deck_with_picture(i64::MAX / 2, i64::MAX / 2, i64::MAX / 2, i64::MAX / 2)));
        assert_eq!(*img.get_pixel(100, 75), WHITE);
    }

    #[test]
    fn deck_without_slides_is_corrupt() {
        let bytes = zip_parts(&[("ppt/presentation.xml", b"<p:presentation/>".to_vec())]);
        let err = render_first_slide(&bytes, &PreviewOptions::default()).unwrap_err();
        assert!(matches!(err, PreviewError::CorruptDocument { .. }));
    }

    #[test]
    fn malformed_slide_is_decode_failure() {
        let parts = presentation_parts(vec!["<p:sld><p:cSld></p:sld>".to_string()]);
        let borrowed: Vec<(&str, Vec<u8>)> = parts.iter().map(|(n, d)| (n.as_str(), d.clone())).collect();
        let err = render_first_slide(&zip_parts(&borrowed), &PreviewOptions::default()).unwrap_err();
        assert!(matches!(err, PreviewError::DecodeFailure { .. }), "got {err:?}");
    }

    #[test]
    fn colours_parse_from_hex() {
        assert_eq!(parse_colour("1F4E79"), Some(Rgba([0x1F, 0x4E, 0x79, 255])));
        assert_eq!(parse_colour("xyz"), None);
    }
}
