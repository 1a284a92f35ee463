use std::fmt::Write as _;

pub const PAGE_WIDTH: f32 = 612.0;
pub const PAGE_HEIGHT: f32 = 792.0;
pub const MARGIN: f32 = 50.0;
const FOOTER_BAND: f32 = 40.0;

/// Base-14 fonts; no font programs are embedded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Font {
    Regular,
    Bold,
    Oblique,
}

impl Font {
    const ALL: [Font; 3] = [Font::Regular, Font::Bold, Font::Oblique];

    const fn resource(self) -> &'static str {
        match self {
            Font::Regular => "F1",
            Font::Bold => "F2",
            Font::Oblique => "F3",
        }
    }

    const fn base_font(self) -> &'static str {
        match self {
            Font::Regular => "Helvetica",
            Font::Bold => "Helvetica-Bold",
            Font::Oblique => "Helvetica-Oblique",
        }
    }

    /// Average glyph advance as a fraction of the font size, used for wrapping and alignment.
    const fn average_advance(self) -> f32 {
        match self {
            Font::Bold => 0.58,
            Font::Regular | Font::Oblique => 0.52,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Align {
    Left,
    Center,
    Right,
}

/// Flowing text layout over US Letter pages.
#[derive(Debug)]
pub struct PageComposer {
    pages: Vec<String>,
    current: String,
    cursor_y: f32,
}

impl Default for PageComposer {
    fn default() -> Self {
        Self::new()
    }
}

impl PageComposer {
    pub fn new() -> Self {
        Self {
            pages: Vec::new(),
            current: String::new(),
            cursor_y: PAGE_HEIGHT - MARGIN,
        }
    }

    /// Writes `text` wrapped to the content width, breaking pages as needed.
    pub fn paragraph(&mut self, font: Font, size: f32, align: Align, text: &str) {
        let width = PAGE_WIDTH - 2.0 * MARGIN;
        for line in wrap(text, font, size, width) {
            self.line(font, size, align, &line);
        }
    }

    /// Label in bold followed by a regular-weight value on the same line.
    pub fn field(&mut self, size: f32, label: &str, value: &str) {
        let leading = size * 1.4;
        self.reserve(leading);
        let label = format!("{label}:");
        let offset = estimate_width(&label, Font::Bold, size) + size * 0.3;
        let y = self.cursor_y - size;
        push_text(&mut self.current, Font::Bold, size, MARGIN, y, &label);
        let remaining = PAGE_WIDTH - 2.0 * MARGIN - offset;
        let mut lines = wrap(value, Font::Regular, size, remaining).into_iter();
        if let Some(first) = lines.next() {
            push_text(&mut self.current, Font::Regular, size, MARGIN + offset, y, &first);
        }
        self.cursor_y -= leading;
        for rest in lines {
            self.reserve(leading);
            let y = self.cursor_y - size;
            push_text(&mut self.current, Font::Regular, size, MARGIN + offset, y, &rest);
            self.cursor_y -= leading;
        }
    }

    /// Two columns of text, left and right halves of the content box.
    pub fn columns(&mut self, font: Font, size: f32, left: &str, right: &str) {
        let leading = size * 1.4;
        self.reserve(leading);
        let y = self.cursor_y - size;
        push_text(&mut self.current, font, size, MARGIN, y, left);
        push_text(&mut self.current, font, size, PAGE_WIDTH / 2.0 + 10.0, y, right);
        self.cursor_y -= leading;
    }

    /// Horizontal rule under the current line.
    pub fn rule(&mut self) {
        self.reserve(8.0);
        let y = self.cursor_y - 4.0;
        let _ = writeln!(
            self.current,
            "0.5 w {MARGIN:.2} {y:.2} m {:.2} {y:.2} l S",
            PAGE_WIDTH - MARGIN
        );
        self.cursor_y -= 8.0;
    }

    pub fn gap(&mut self, points: f32) {
        self.cursor_y -= points;
    }

    /// Closes the layout, stamping `footer` and a page counter on every page.
    pub fn finish(mut self, title: &str, footer: &str) -> Vec<u8> {
        if !self.current.is_empty() || self.pages.is_empty() {
            self.pages.push(std::mem::take(&mut self.current));
        }

        let total = self.pages.len();
        let streams: Vec<String> = self
            .pages
            .into_iter()
            .enumerate()
            .map(|(index, mut content)| {
                let stamp = format!("{footer}  |  Page {} of {total}", index + 1);
                let x = centered_x(&stamp, Font::Oblique, 8.0, PAGE_WIDTH - 2.0 * MARGIN);
                push_text(&mut content, Font::Oblique, 8.0, x, MARGIN - 20.0, &stamp);
                content
            })
            .collect();

        serialize(title, &streams)
    }

    fn line(&mut self, font: Font, size: f32, align: Align, text: &str) {
        let leading = size * 1.4;
        self.reserve(leading);
        let width = PAGE_WIDTH - 2.0 * MARGIN;
        let x = match align {
            Align::Left => MARGIN,
            Align::Center => centered_x(text, font, size, width),
            Align::Right => MARGIN + (width - estimate_width(text, font, size)).max(0.0),
        };
        push_text(&mut self.current, font, size, x, self.cursor_y - size, text);
        self.cursor_y -= leading;
    }

    fn reserve(&mut self, height: f32) {
        if self.cursor_y - height < MARGIN + FOOTER_BAND {
            self.pages.push(std::mem::take(&mut self.current));
            self.cursor_y = PAGE_HEIGHT - MARGIN;
        }
    }
}

fn centered_x(text: &str, font: Font, size: f32, width: f32) -> f32 {
    MARGIN + ((width - estimate_width(text, font, size)) / 2.0).max(0.0)
}

fn estimate_width(text: &str, font: Font, size: f32) -> f32 {
    text.chars().count() as f32 * size * font.average_advance()
}

/// Greedy word wrap. Words longer than a full line are split.
fn wrap(text: &str, font: Font, size: f32, width: f32) -> Vec<String> {
    let max_chars = ((width / (size * font.average_advance())).floor() as usize).max(1);
    let mut lines = Vec::new();

    for paragraph in text.split('\n') {
        let mut line = String::new();
        for word in paragraph.split_whitespace() {
            let mut word: Vec<char> = word.chars().collect();
            while word.len() > max_chars {
                if !line.is_empty() {
                    lines.push(std::mem::take(&mut line));
                }
                let rest = word.split_off(max_chars);
                lines.push(word.into_iter().collect());
                word = rest;
            }

            let word: String = word.into_iter().collect();
            let needed = if line.is_empty() {
                word.chars().count()
            } else {
                line.chars().count() + 1 + word.chars().count()
            };
            if needed > max_chars && !line.is_empty() {
                lines.push(std::mem::take(&mut line));
            }
            if !line.is_empty() {
                line.push(' ');
            }
            line.push_str(&word);
        }
        lines.push(line);
    }

    lines
}

fn push_text(content: &mut String, font: Font, size: f32, x: f32, y: f32, text: &str) {
    let _ = writeln!(
        content,
        "BT /{} {size:.1} Tf {x:.2} {y:.2} Td ({}) Tj ET",
        font.resource(),
        escape(text)
    );
}

/// Literal-string escaping for WinAnsiEncoding; characters outside Latin-1 become '?'.
fn escape(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '(' | ')' | '\\' => {
                escaped.push('\\');
                escaped.push(c);
            }
            ' '..='~' => escaped.push(c),
            '\u{a0}'..='\u{ff}' => {
                let _ = write!(escaped, "\\{:03o}", c as u32);
            }
            _ => escaped.push('?'),
        }
    }
    escaped
}

fn serialize(title: &str, streams: &[String]) -> Vec<u8> {
    // 1 catalog, 2 page tree, 3..=5 fonts, 6 info, then a (page, content) pair per page.
    let first_page = 7;
    let page_ids: Vec<usize> = (0..streams.len()).map(|i| first_page + 2 * i).collect();

    let mut objects: Vec<Vec<u8>> = Vec::new();
    objects.push(b"<< /Type /Catalog /Pages 2 0 R >>".to_vec());
    let kids = page_ids
        .iter()
        .map(|id| format!("{id} 0 R"))
        .collect::<Vec<_>>()
        .join(" ");
    objects.push(format!("<< /Type /Pages /Kids [{kids}] /Count {} >>", streams.len()).into_bytes());
    for font in Font::ALL {
        objects.push(
            format!(
                "<< /Type /Font /Subtype /Type1 /BaseFont /{} /Encoding /WinAnsiEncoding >>",
                font.base_font()
            )
            .into_bytes(),
        );
    }
    objects.push(format!("<< /Title ({}) /Producer (praevon) >>", escape(title)).into_bytes());

    for (stream, page_id) in streams.iter().zip(&page_ids) {
        objects.push(
            format!(
                "<< /Type /Page /Parent 2 0 R /MediaBox [0 0 {PAGE_WIDTH:.0} {PAGE_HEIGHT:.0}] \
                 /Resources << /Font << /F1 3 0 R /F2 4 0 R /F3 5 0 R >> >> /Contents {} 0 R >>",
                page_id + 1
            )
            .into_bytes(),
        );
        let mut content = format!("<< /Length {} >>\nstream\n", stream.len()).into_bytes();
        content.extend_from_slice(stream.as_bytes());
        content.extend_from_slice(b"\nendstream");
        objects.push(content);
    }

    let mut out = Vec::new();
    out.extend_from_slice(b"%PDF-1.4\n%\xE2\xE3\xCF\xD3\n");
    let mut offsets = Vec::with_capacity(objects.len());
    for (index, body) in objects.iter().enumerate() {
        offsets.push(out.len());
        out.extend_from_slice(format!("{} 0 obj\n", index + 1).as_bytes());
        out.extend_from_slice(body);
        out.extend_from_slice(b"\nendobj\n");
    }

    let xref_offset = out.len();
    let mut xref = format!("xref\n0 {}\n0000000000 65535 f \n", objects.len() + 1);
    for offset in offsets {
        let _ = writeln!(xref, "{offset:010} 00000 n ");
    }
    let _ = write!(
        xref,
        "trailer\n<< /Size {} /Root 1 0 R /Info 6 0 R >>\nstartxref\n{xref_offset}\n%%EOF\n",
        objects.len() + 1
    );
    out.extend_from_slice(xref.as_bytes());
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wrap_respects_width_and_splits_long_words() {
        let lines = wrap(&"word ".repeat(60), Font::Regular, 10.0, 100.0);
        let max_chars = (100.0 / (10.0 * Font::Regular.average_advance())).floor() as usize;
        assert!(lines.len() > 1);
        assert!(lines.iter().all(|line| line.chars().count() <= max_chars));

        let long = wrap(&"x".repeat(50), Font::Regular, 10.0, 100.0);
        assert!(long.iter().all(|line| line.chars().count() <= max_chars));
        assert_eq!(long.concat().len(), 50);
    }

    #[test]
    fn escape_handles_delimiters_and_latin1() {
        assert_eq!(escape("a(b)c\\"), "a\\(b\\)c\\\\");
        assert_eq!(escape("Bogotá"), "Bogot\\341");
        assert_eq!(escape("日"), "?");
    }

    #[test]
    fn long_documents_break_into_pages() {
        let mut composer = PageComposer::new();
        for index in 0..120 {
            composer.paragraph(Font::Regular, 11.0, Align::Left, &format!("line {index}"));
        }
        let bytes = composer.finish("test", "footer");
        let text = String::from_utf8_lossy(&bytes);
        assert!(text.contains("/Count 2") || text.contains("/Count 3"));
        assert!(text.contains("Page 1 of"));
        assert!(text.ends_with("%%EOF\n"));
    }

    #[test]
    fn xref_offsets_point_at_objects() {
        let mut composer = PageComposer::new();
        composer.paragraph(Font::Bold, 14.0, Align::Center, "Heading");
        let bytes = composer.finish("doc", "footer");
        let text = String::from_utf8_lossy(&bytes).into_owned();

        let xref_at = text.find("xref\n").expect("xref table");
        let entries: Vec<usize> = text[xref_at..]
            .lines()
            .skip(3)
            .take_while(|line| line.ends_with(" n "))
            .map(|line| line[..10].parse().expect("offset"))
            .collect();
        assert_eq!(entries.len(), 8);
        for (index, offset) in entries.iter().enumerate() {
            assert!(bytes[*offset..].starts_with(format!("{} 0 obj", index + 1).as_bytes()));
        }
    }
}
