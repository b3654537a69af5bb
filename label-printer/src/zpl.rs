//! ZPL command builder
//!
//! Provides a fluent API for building ZPL II label data, used for the
//! built-in raw templates. Coordinates are in printer dots.

/// Escape text placed inside a `^FD … ^FS` field.
///
/// `^` and `~` start commands; they are written through the `^FH`
/// hexadecimal escape instead.
pub fn escape_field_data(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '^' => out.push_str("_5E"),
            '~' => out.push_str("_7E"),
            '_' => out.push_str("_5F"),
            _ => out.push(c),
        }
    }
    out
}

/// ZPL command builder
///
/// Builds one `^XA … ^XZ` label.
pub struct ZplBuilder {
    buf: String,
}

impl ZplBuilder {
    /// Start a new label (`^XA`)
    pub fn new() -> Self {
        let mut buf = String::with_capacity(512);
        buf.push_str("^XA");
        Self { buf }
    }

    // === Label Setup ===

    /// Switch the printer to UTF-8 field data (`^CI28`)
    pub fn utf8(&mut self) -> &mut Self {
        self.buf.push_str("^CI28");
        self
    }

    /// Label home offset (`^LH`)
    pub fn label_home(&mut self, x: u32, y: u32) -> &mut Self {
        self.buf.push_str(&format!("^LH{},{}", x, y));
        self
    }

    /// Print width in dots (`^PW`)
    pub fn print_width(&mut self, dots: u32) -> &mut Self {
        self.buf.push_str(&format!("^PW{}", dots));
        self
    }

    // === Fields ===

    /// Position the next field (`^FO`)
    pub fn field_origin(&mut self, x: u32, y: u32) -> &mut Self {
        self.buf.push_str(&format!("^FO{},{}", x, y));
        self
    }

    /// Select the scalable font for the next field (`^A0N`)
    pub fn font(&mut self, height: u32, width: u32) -> &mut Self {
        self.buf.push_str(&format!("^A0N,{},{}", height, width));
        self
    }

    /// Text field (`^FH^FD … ^FS`)
    pub fn text(&mut self, s: &str) -> &mut Self {
        self.text_escaped(&escape_field_data(s))
    }

    /// Text field whose content was already passed through [`escape_field_data`]
    pub fn text_escaped(&mut self, escaped: &str) -> &mut Self {
        self.buf.push_str("^FH^FD");
        self.buf.push_str(escaped);
        self.buf.push_str("^FS");
        self
    }

    /// Code 128 barcode with interpretation line below (`^BCN`)
    pub fn code128(&mut self, data: &str, height: u32) -> &mut Self {
        self.buf.push_str(&format!("^BY2^BCN,{},Y,N,N", height));
        self.text(data)
    }

    /// QR code, model 2 (`^BQN`)
    ///
    /// `magnification` is clamped to the printer's 1..=10 range.
    pub fn qr_code(&mut self, data: &str, magnification: u8) -> &mut Self {
        let m = magnification.clamp(1, 10);
        self.buf.push_str(&format!("^BQN,2,{}", m));
        // QA = error correction level Q, automatic data mode
        self.buf.push_str("^FH^FDQA,");
        self.buf.push_str(&escape_field_data(data));
        self.buf.push_str("^FS");
        self
    }

    /// Horizontal rule (`^GB`)
    pub fn rule(&mut self, width: u32, thickness: u32) -> &mut Self {
        self.buf
            .push_str(&format!("^GB{},{},{}^FS", width, thickness, thickness));
        self
    }

    // === Output ===

    /// Number of copies (`^PQ`)
    pub fn quantity(&mut self, copies: u32) -> &mut Self {
        self.buf.push_str(&format!("^PQ{}", copies.max(1)));
        self
    }

    /// Append raw ZPL
    pub fn raw(&mut self, zpl: &str) -> &mut Self {
        self.buf.push_str(zpl);
        self
    }

    /// Close the label (`^XZ`) and return the ZPL text
    pub fn build(mut self) -> String {
        self.buf.push_str("^XZ");
        self.buf
    }
}

impl Default for ZplBuilder {
    fn default() -> Self {
        Self::new()
    }
}
