//! Page layout for driver-drawn labels
//!
//! Text labels are not spooled raw: the content is split into lines and
//! each line is drawn at its own vertical offset onto a single page. The
//! page is assumed to be large enough; lines past the bottom edge are kept
//! (the driver clips them) and reported by [`PageDocument::overflow_lines`].

use tracing::warn;

const MM_PER_POINT: f32 = 25.4 / 72.0;

/// Font and margin settings of a page
#[derive(Debug, Clone, PartialEq)]
pub struct PageLayout {
    pub font_family: String,
    pub font_size_pt: f32,
    /// Multiplier applied to the font height between baselines
    pub line_spacing: f32,
    pub margin_left_mm: f32,
    pub margin_top_mm: f32,
    pub width_mm: Option<f32>,
    pub height_mm: Option<f32>,
}

impl PageLayout {
    /// Distance between two consecutive lines
    pub fn line_height_mm(&self) -> f32 {
        self.font_size_pt * self.line_spacing * MM_PER_POINT
    }
}

impl Default for PageLayout {
    fn default() -> Self {
        Self {
            font_family: "Arial".to_string(),
            font_size_pt: 10.0,
            line_spacing: 1.2,
            margin_left_mm: 2.0,
            margin_top_mm: 2.0,
            width_mm: None,
            height_mm: None,
        }
    }
}

/// One line positioned on the page
#[derive(Debug, Clone, PartialEq)]
pub struct PageLine {
    pub text: String,
    pub x_mm: f32,
    pub y_mm: f32,
}

/// A single-page document ready for drawing
#[derive(Debug, Clone, PartialEq)]
pub struct PageDocument {
    /// Spooler job name
    pub title: String,
    pub layout: PageLayout,
    pub lines: Vec<PageLine>,
}

impl PageDocument {
    /// Lay out text line by line from the top margin
    pub fn from_text(title: impl Into<String>, text: &str, layout: PageLayout) -> Self {
        let line_height = layout.line_height_mm();
        let lines: Vec<PageLine> = text
            .lines()
            .enumerate()
            .map(|(i, line)| PageLine {
                text: line.trim_end_matches('\r').to_string(),
                x_mm: layout.margin_left_mm,
                y_mm: layout.margin_top_mm + i as f32 * line_height,
            })
            .collect();

        let doc = Self {
            title: title.into(),
            layout,
            lines,
        };

        let overflow = doc.overflow_lines();
        if overflow > 0 {
            warn!(title = %doc.title, overflow, "Label text does not fit on one page");
        }
        doc
    }

    /// Number of lines whose baseline falls below the page height
    pub fn overflow_lines(&self) -> usize {
        let Some(height) = self.layout.height_mm else {
            return 0;
        };
        let line_height = self.layout.line_height_mm();
        self.lines
            .iter()
            .filter(|l| l.y_mm + line_height > height)
            .count()
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    /// Plain text rendition for printers without a page driver
    ///
    /// Lines are CRLF separated and the page is closed with a form feed.
    pub fn to_plain_text(&self) -> String {
        let mut out = String::new();
        for line in &self.lines {
            out.push_str(&line.text);
            out.push_str("\r\n");
        }
        out.push('\x0C');
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lines_drawn_sequentially() {
        let doc = PageDocument::from_text("job", "A\nB\r\nC", PageLayout::default());
        assert_eq!(doc.lines.len(), 3);
        assert_eq!(doc.lines[1].text, "B");

        let step = PageLayout::default().line_height_mm();
        assert!((doc.lines[0].y_mm - 2.0).abs() < f32::EPSILON);
        assert!((doc.lines[2].y_mm - (2.0 + 2.0 * step)).abs() < 1e-4);
        assert!(doc.lines.iter().all(|l| l.x_mm == 2.0));
    }

    #[test]
    fn test_overflow_lines() {
        let layout = PageLayout {
            height_mm: Some(12.0),
            ..PageLayout::default()
        };
        let doc = PageDocument::from_text("job", "1\n2\n3\n4\n5", layout);
        // 10pt * 1.2 ≈ 4.23mm per line, top margin 2mm
        assert_eq!(doc.overflow_lines(), 3);

        let unbounded = PageDocument::from_text("job", "1\n2\n3\n4\n5", PageLayout::default());
        assert_eq!(unbounded.overflow_lines(), 0);
    }

    #[test]
    fn test_plain_text() {
        let doc = PageDocument::from_text("job", "SN-1\nR=12.346", PageLayout::default());
        assert_eq!(doc.to_plain_text(), "SN-1\r\nR=12.346\r\n\x0C");
    }
}
