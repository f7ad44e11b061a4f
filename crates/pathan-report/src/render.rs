//! PDF 渲染
//!
//! A4 纵向，左右边距 20 mm。文本到达下边距时自动分页，长行按词换行。

use chrono::NaiveDate;
use image::DynamicImage;
use pathan_core::config::ReportConfig;
use pathan_core::utils::report_file_name;
use pathan_core::{PatientRecord, UploadedImage};
use printpdf::{
    BuiltinFont, Image, ImageTransform, IndirectFontRef, Mm, PdfDocument, PdfDocumentReference,
    PdfLayerReference,
};
use std::fs::File;
use std::io::BufWriter;
use std::path::PathBuf;
use tracing::{debug, info, warn};

use crate::error::ReportError;
use crate::layout::{Block, ReportInput, ReportLayout, REPORT_TITLE};

pub const PDF_CONTENT_TYPE: &str = "application/pdf";

const PAGE_WIDTH: f32 = 210.0;
const PAGE_HEIGHT: f32 = 297.0;
const MARGIN_X: f32 = 20.0;
const TOP_Y: f32 = 280.0;
const BOTTOM_Y: f32 = 20.0;

/// 图像宽度与左边距（毫米）
const IMAGE_WIDTH: f32 = 100.0;
const IMAGE_X: f32 = 55.0;

const PT_TO_MM: f32 = 0.3528;
/// 平均字宽约为字号的 0.55 倍
const AVG_GLYPH_EM: f32 = 0.55;

/// 生成的报告文件
#[derive(Debug, Clone)]
pub struct ReportDocument {
    pub file_name: String,
    pub bytes: Vec<u8>,
}

impl ReportDocument {
    pub fn content_type(&self) -> &'static str {
        PDF_CONTENT_TYPE
    }
}

/// 报告导出器
#[derive(Debug, Clone, Default)]
pub struct ReportExporter {
    font_path: Option<PathBuf>,
}

impl ReportExporter {
    pub fn new(font_path: Option<PathBuf>) -> Self {
        Self { font_path }
    }

    pub fn from_config(config: &ReportConfig) -> Self {
        Self::new(
            config
                .font_path
                .as_deref()
                .filter(|p| !p.trim().is_empty())
                .map(PathBuf::from),
        )
    }

    /// 生成 PDF 报告
    pub fn export(
        &self,
        patient: &PatientRecord,
        conclusion: &str,
        image: Option<&UploadedImage>,
        report_date: NaiveDate,
    ) -> Result<ReportDocument, ReportError> {
        let layout = ReportLayout::build(&ReportInput {
            patient,
            conclusion,
            has_image: image.is_some(),
            report_date,
        });

        let bytes = self.render(&layout, image)?;
        let file_name = report_file_name(patient.display_name(), report_date);
        info!("Report {} rendered ({} bytes)", file_name, bytes.len());

        Ok(ReportDocument { file_name, bytes })
    }

    /// 将版式绘制为 PDF 字节
    pub fn render(&self, layout: &ReportLayout, image: Option<&UploadedImage>) -> Result<Vec<u8>, ReportError> {
        let (doc, page, layer) = PdfDocument::new(REPORT_TITLE, Mm(PAGE_WIDTH), Mm(PAGE_HEIGHT), "Layer 1");
        let font = self.load_font(&doc)?;

        {
            let mut writer = PageWriter {
                doc: &doc,
                layer: doc.get_page(page).get_layer(layer),
                font,
                y: TOP_Y,
                pages: 1,
            };

            for block in &layout.blocks {
                match block {
                    Block::Title(text) => writer.centered(text, 18.0, 10.0),
                    Block::Subtitle(text) => writer.centered(text, 10.0, 8.0),
                    Block::Heading(text) => writer.line(text, 12.0, 8.0),
                    Block::Paragraph(text) => writer.paragraph(text, 10.0, 5.5),
                    Block::Footer(text) => writer.paragraph(text, 8.0, 4.5),
                    Block::Gap(mm) => writer.y -= mm,
                    Block::Image => {
                        if let Some(image) = image {
                            if let Err(e) = writer.image(image) {
                                warn!("Embedding image {} failed: {}", image.file_name, e);
                                writer.paragraph(&format!("[Ошибка добавления фото: {}]", e), 10.0, 5.5);
                            }
                        }
                    }
                }
            }
            debug!("Report layout spans {} page(s)", writer.pages);
        }

        let mut buf = BufWriter::new(Vec::new());
        doc.save(&mut buf)?;
        buf.into_inner()
            .map_err(|e| ReportError::Render(format!("PDF buffer error: {e}")))
    }

    /// 优先加载支持西里尔字母的外部字体，失败时退回内置 Helvetica
    fn load_font(&self, doc: &PdfDocumentReference) -> Result<IndirectFontRef, ReportError> {
        if let Some(path) = &self.font_path {
            match File::open(path) {
                Ok(file) => match doc.add_external_font(file) {
                    Ok(font) => return Ok(font),
                    Err(e) => warn!("Font {} unusable, falling back to Helvetica: {}", path.display(), e),
                },
                Err(e) => warn!("Font {} not found, falling back to Helvetica: {}", path.display(), e),
            }
        }
        doc.add_builtin_font(BuiltinFont::Helvetica)
            .map_err(|e| ReportError::Font(e.to_string()))
    }
}

struct PageWriter<'a> {
    doc: &'a PdfDocumentReference,
    layer: PdfLayerReference,
    font: IndirectFontRef,
    y: f32,
    pages: usize,
}

impl PageWriter<'_> {
    /// 剩余空间不足时换页
    fn ensure_space(&mut self, needed: f32) {
        if self.y - needed < BOTTOM_Y {
            let (page, layer) = self.doc.add_page(Mm(PAGE_WIDTH), Mm(PAGE_HEIGHT), "Layer 1");
            self.layer = self.doc.get_page(page).get_layer(layer);
            self.y = TOP_Y;
            self.pages += 1;
        }
    }

    fn line(&mut self, text: &str, size: f32, height: f32) {
        self.ensure_space(height);
        self.layer.use_text(text, size, Mm(MARGIN_X), Mm(self.y), &self.font);
        self.y -= height;
    }

    fn centered(&mut self, text: &str, size: f32, height: f32) {
        self.ensure_space(height);
        let width = text_width_mm(text, size);
        let x = ((PAGE_WIDTH - width) / 2.0).max(MARGIN_X);
        self.layer.use_text(text, size, Mm(x), Mm(self.y), &self.font);
        self.y -= height;
    }

    fn paragraph(&mut self, text: &str, size: f32, height: f32) {
        if text.trim().is_empty() {
            self.y -= height;
            return;
        }
        for line in wrap_text(text, max_chars(size)) {
            self.line(&line, size, height);
        }
    }

    fn image(&mut self, upload: &UploadedImage) -> Result<(), ReportError> {
        let decoded = image::load_from_memory(&upload.bytes)?;
        let rgb = flatten_alpha(decoded);
        let width_px = rgb.width().max(1) as f32;
        let (width_mm, height_mm) = image_size_mm(width_px, rgb.height() as f32);

        self.ensure_space(height_mm);
        let bottom = self.y - height_mm;
        Image::from_dynamic_image(&rgb).add_to_layer(
            self.layer.clone(),
            ImageTransform {
                translate_x: Some(Mm(IMAGE_X + (IMAGE_WIDTH - width_mm) / 2.0)),
                translate_y: Some(Mm(bottom)),
                dpi: Some(width_px * 25.4 / width_mm),
                ..Default::default()
            },
        );
        self.y = bottom;
        Ok(())
    }
}

/// 图像在页面上的尺寸（毫米）：固定宽度，过高时按可用高度等比缩小
fn image_size_mm(width_px: f32, height_px: f32) -> (f32, f32) {
    let width_px = width_px.max(1.0);
    let height_mm = height_px * IMAGE_WIDTH / width_px;
    let max_height = TOP_Y - BOTTOM_Y;
    if height_mm > max_height {
        (IMAGE_WIDTH * max_height / height_mm, max_height)
    } else {
        (IMAGE_WIDTH, height_mm)
    }
}

/// 去掉透明通道
fn flatten_alpha(image: DynamicImage) -> DynamicImage {
    if image.color().has_alpha() {
        DynamicImage::ImageRgb8(image.to_rgb8())
    } else {
        image
    }
}

fn text_width_mm(text: &str, size: f32) -> f32 {
    text.chars().count() as f32 * size * AVG_GLYPH_EM * PT_TO_MM
}

fn max_chars(size: f32) -> usize {
    let usable = PAGE_WIDTH - 2.0 * MARGIN_X;
    ((usable / (size * AVG_GLYPH_EM * PT_TO_MM)) as usize).max(10)
}

/// 按词换行（按字符计数）
fn wrap_text(text: &str, max_chars: usize) -> Vec<String> {
    let mut lines = Vec::new();
    let mut current = String::new();
    let mut current_len = 0;

    for word in text.split_whitespace() {
        let word_len = word.chars().count();
        if current_len + word_len + 1 > max_chars && !current.is_empty() {
            lines.push(std::mem::take(&mut current));
            current_len = 0;
        }
        if !current.is_empty() {
            current.push(' ');
            current_len += 1;
        }
        current.push_str(word);
        current_len += word_len;
    }
    if !current.is_empty() {
        lines.push(current);
    }
    lines
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{ImageOutputFormat, Rgba, RgbaImage};
    use std::io::Cursor;

    fn png_with_alpha() -> Vec<u8> {
        let img = RgbaImage::from_pixel(8, 4, Rgba([200, 30, 30, 128]));
        let mut bytes = Vec::new();
        DynamicImage::ImageRgba8(img)
            .write_to(&mut Cursor::new(&mut bytes), ImageOutputFormat::Png)
            .unwrap();
        bytes
    }

    fn patient() -> PatientRecord {
        PatientRecord {
            name: "Иванов И.И.".to_string(),
            weight_kg: 70.0,
            ..Default::default()
        }
    }

    fn date() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 3, 5).unwrap()
    }

    #[test]
    fn test_wrap_text_respects_width() {
        let lines = wrap_text("один два три четыре пять", 10);
        assert_eq!(lines, vec!["один два", "три четыре", "пять"]);
        assert!(wrap_text("   ", 10).is_empty());
    }

    #[test]
    fn test_wrap_text_keeps_line_of_exact_width() {
        assert_eq!(wrap_text("абвгд еёжз", 10), vec!["абвгд еёжз"]);
        assert_eq!(wrap_text("абвгд еёжзи", 10), vec!["абвгд", "еёжзи"]);
    }

    #[test]
    fn test_tall_image_is_scaled_to_printable_height() {
        let (width, height) = image_size_mm(100.0, 400.0);
        assert!((height - (TOP_Y - BOTTOM_Y)).abs() < 1e-3);
        assert!((width - IMAGE_WIDTH * (TOP_Y - BOTTOM_Y) / 400.0).abs() < 1e-3);

        let (width, height) = image_size_mm(200.0, 100.0);
        assert_eq!(width, IMAGE_WIDTH);
        assert!((height - 50.0).abs() < 1e-3);
    }

    #[test]
    fn test_export_with_very_tall_image() {
        let img = image::RgbImage::from_pixel(10, 60, image::Rgb([200, 120, 160]));
        let mut bytes = Vec::new();
        image::DynamicImage::ImageRgb8(img)
            .write_to(&mut std::io::Cursor::new(&mut bytes), image::ImageOutputFormat::Png)
            .unwrap();
        let upload = UploadedImage {
            file_name: "tall.png".to_string(),
            content_type: "image/png".to_string(),
            bytes,
        };
        let doc = ReportExporter::new(None)
            .export(&patient(), "Текст", Some(&upload), date())
            .unwrap();
        assert!(doc.bytes.starts_with(b"%PDF"));
    }

    #[test]
    fn test_export_produces_pdf_with_fallback_font() {
        let exporter = ReportExporter::new(Some(PathBuf::from("/nonexistent/font.ttf")));
        let upload = UploadedImage {
            file_name: "slide.png".to_string(),
            content_type: "image/png".to_string(),
            bytes: png_with_alpha(),
        };

        let report = exporter
            .export(&patient(), "**Норма**", Some(&upload), date())
            .unwrap();
        assert!(report.bytes.starts_with(b"%PDF"));
        assert_eq!(report.file_name, "Иванов_И.И_2024-03-05.pdf");
        assert_eq!(report.content_type(), "application/pdf");
    }

    #[test]
    fn test_long_conclusion_spans_pages() {
        let exporter = ReportExporter::default();
        let conclusion = "Строка заключения с описанием.\n".repeat(120);
        let report = exporter.export(&patient(), &conclusion, None, date()).unwrap();
        assert!(report.bytes.starts_with(b"%PDF"));
    }

    #[test]
    fn test_undecodable_image_does_not_fail_export() {
        let exporter = ReportExporter::default();
        let upload = UploadedImage {
            file_name: "broken.png".to_string(),
            content_type: "image/png".to_string(),
            bytes: vec![1, 2, 3],
        };
        let report = exporter
            .export(&patient(), "Норма", Some(&upload), date())
            .unwrap();
        assert!(report.bytes.starts_with(b"%PDF"));
    }

    #[test]
    fn test_flatten_alpha() {
        let decoded = image::load_from_memory(&png_with_alpha()).unwrap();
        assert!(decoded.color().has_alpha());
        assert!(!flatten_alpha(decoded).color().has_alpha());
    }
}
