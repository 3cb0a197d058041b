use image::{DynamicImage, GrayImage};
use printpdf::{
    BuiltinFont, Color, Greyscale, Image, ImageTransform, IndirectFontRef, Line, Mm,
    PdfDocument, PdfLayerReference, Point,
};

use crate::services::license_document::{
    LicenseDocument, DISCLAIMER, ISSUING_AUTHORITY, LETTERHEAD, NOTICE,
};

// A4 portrait
const PAGE_WIDTH: f32 = 210.0;
const PAGE_HEIGHT: f32 = 297.0;
const MARGIN: f32 = 25.0;

const TABLE_LABEL_WIDTH: f32 = 60.0;
const TABLE_ROW_HEIGHT: f32 = 9.0;

const LETTERHEAD_WIDTH_MM: f32 = 30.0;
const QR_WIDTH_MM: f32 = 40.0;

const PT_TO_MM: f32 = 0.3528;
/// Average Helvetica glyph width as a fraction of the font size.
const AVG_GLYPH_WIDTH: f32 = 0.52;

#[derive(thiserror::Error, Debug)]
pub enum PdfRenderError {
    #[error("PDF rendering failed: {0}")]
    Pdf(#[from] printpdf::Error),
}

struct Fonts {
    regular: IndirectFontRef,
    bold: IndirectFontRef,
}

fn centered_x(text: &str, font_size: f32) -> f32 {
    let width = text.chars().count() as f32 * font_size * AVG_GLYPH_WIDTH * PT_TO_MM;
    ((PAGE_WIDTH - width) / 2.0).max(MARGIN)
}

fn draw_line(layer: &PdfLayerReference, from: (f32, f32), to: (f32, f32)) {
    layer.add_line(Line {
        points: vec![
            (Point::new(Mm(from.0), Mm(from.1)), false),
            (Point::new(Mm(to.0), Mm(to.1)), false),
        ],
        is_closed: false,
    });
}

/// Places `image` with its top edge at `top` (mm from the page bottom), centred
/// horizontally and scaled to `width_mm`. Returns the image bottom edge.
fn place_image(layer: &PdfLayerReference, image: &DynamicImage, width_mm: f32, top: f32) -> f32 {
    let px_width = image.width().max(1) as f32;
    let px_height = image.height() as f32;
    let dpi = px_width * 25.4 / width_mm;
    let height_mm = px_height * 25.4 / dpi;
    let bottom = top - height_mm;

    let rgb = DynamicImage::ImageRgb8(image.to_rgb8());
    Image::from_dynamic_image(&rgb).add_to_layer(
        layer.clone(),
        ImageTransform {
            translate_x: Some(Mm((PAGE_WIDTH - width_mm) / 2.0)),
            translate_y: Some(Mm(bottom)),
            dpi: Some(dpi),
            ..Default::default()
        },
    );

    bottom
}

fn draw_details_table(layer: &PdfLayerReference, fonts: &Fonts, doc: &LicenseDocument, top: f32) -> f32 {
    let left = MARGIN;
    let right = PAGE_WIDTH - MARGIN;
    let divider = left + TABLE_LABEL_WIDTH;
    let bottom = top - TABLE_ROW_HEIGHT * doc.rows.len() as f32;

    layer.set_outline_color(Color::Greyscale(Greyscale::new(0.5, None)));
    layer.set_outline_thickness(0.75);

    for (i, (label, value)) in doc.rows.iter().enumerate() {
        let row_top = top - TABLE_ROW_HEIGHT * i as f32;
        draw_line(layer, (left, row_top), (right, row_top));

        let baseline = row_top - TABLE_ROW_HEIGHT + 3.0;
        layer.use_text(*label, 11.0, Mm(left + 2.0), Mm(baseline), &fonts.bold);
        layer.use_text(value.as_str(), 11.0, Mm(divider + 2.0), Mm(baseline), &fonts.regular);
    }

    draw_line(layer, (left, bottom), (right, bottom));
    draw_line(layer, (left, top), (left, bottom));
    draw_line(layer, (divider, top), (divider, bottom));
    draw_line(layer, (right, top), (right, bottom));

    bottom
}

/// Renders the license document as an A4 PDF.
///
/// The letterhead image is optional; without it the title moves up.
pub fn render_license_pdf(
    doc: &LicenseDocument,
    qr: &GrayImage,
    letterhead: Option<&DynamicImage>,
) -> Result<Vec<u8>, PdfRenderError> {
    let (pdf, page, layer_index) =
        PdfDocument::new(doc.title(), Mm(PAGE_WIDTH), Mm(PAGE_HEIGHT), "License");
    let layer = pdf.get_page(page).get_layer(layer_index);

    let fonts = Fonts {
        regular: pdf.add_builtin_font(BuiltinFont::Helvetica)?,
        bold: pdf.add_builtin_font(BuiltinFont::HelveticaBold)?,
    };

    let mut cursor = PAGE_HEIGHT - 20.0;

    if let Some(letterhead) = letterhead {
        cursor = place_image(&layer, letterhead, LETTERHEAD_WIDTH_MM, cursor) - 8.0;
    }

    for line in LETTERHEAD {
        cursor -= 8.0;
        layer.use_text(line, 16.0, Mm(centered_x(line, 16.0)), Mm(cursor), &fonts.bold);
    }

    cursor = draw_details_table(&layer, &fonts, doc, cursor - 12.0);

    cursor -= 14.0;
    layer.use_text(NOTICE, 13.0, Mm(centered_x(NOTICE, 13.0)), Mm(cursor), &fonts.bold);

    let qr_image = DynamicImage::ImageLuma8(qr.clone());
    cursor = place_image(&layer, &qr_image, QR_WIDTH_MM, cursor - 6.0);

    cursor -= 10.0;
    layer.use_text(
        ISSUING_AUTHORITY,
        10.0,
        Mm(centered_x(ISSUING_AUTHORITY, 10.0)),
        Mm(cursor),
        &fonts.regular,
    );
    cursor -= 6.0;
    layer.use_text(
        DISCLAIMER,
        8.0,
        Mm(centered_x(DISCLAIMER, 8.0)),
        Mm(cursor),
        &fonts.regular,
    );

    Ok(pdf.save_to_bytes()?)
}
