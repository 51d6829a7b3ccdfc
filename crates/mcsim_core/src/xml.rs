//! Best-effort XML introspection sink.
//!
//! Agents describe themselves into an [`XmlSink`] as nested tagged records:
//! type name, node identity (so shared children can be spotted in the
//! output) and constructor-style attributes. The format is diagnostic only
//! and not stable.

use std::fmt::Write;

/// A tag under construction: a name plus attribute pairs.
#[derive(Debug, Clone)]
pub struct XmlTag {
    name: String,
    attrs: Vec<(String, String)>,
}

impl XmlTag {
    /// Starts a tag with the given element name.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            attrs: Vec::new(),
        }
    }

    /// Appends an attribute rendered with `Display`.
    pub fn attr(mut self, key: &str, value: impl std::fmt::Display) -> Self {
        self.attrs.push((key.to_string(), value.to_string()));
        self
    }

    fn render_open(&self, out: &mut String, self_closing: bool) {
        out.push('<');
        out.push_str(&self.name);
        for (k, v) in &self.attrs {
            let _ = write!(out, " {}=\"{}\"", k, escape(v));
        }
        out.push_str(if self_closing { "/>" } else { ">" });
    }
}

fn escape(v: &str) -> String {
    v.replace('&', "&amp;").replace('<', "&lt;").replace('"', "&quot;")
}

/// Accumulates the XML introspection output.
#[derive(Debug, Default)]
pub struct XmlSink {
    buf: String,
    stack: Vec<String>,
}

impl XmlSink {
    /// An empty sink.
    pub fn new() -> Self {
        Self::default()
    }

    /// Writes a self-closing element.
    pub fn leaf(&mut self, tag: XmlTag) {
        tag.render_open(&mut self.buf, true);
    }

    /// Opens an element that will contain children; pair with [`close`].
    ///
    /// [`close`]: XmlSink::close
    pub fn open(&mut self, tag: XmlTag) {
        let name = tag.name.clone();
        tag.render_open(&mut self.buf, false);
        self.stack.push(name);
    }

    /// Closes the innermost open element. A close without a matching open is
    /// ignored.
    pub fn close(&mut self) {
        if let Some(name) = self.stack.pop() {
            let _ = write!(self.buf, "</{}>", name);
        }
    }

    /// The rendered output so far.
    pub fn as_str(&self) -> &str {
        &self.buf
    }

    /// Consumes the sink and returns the rendered output.
    pub fn finish(mut self) -> String {
        while !self.stack.is_empty() {
            self.close();
        }
        self.buf
    }
}

/// Short type name for tags: the path-free tail of `type_name`, with any
/// generic arguments stripped.
pub fn short_type_name<T: ?Sized>() -> &'static str {
    let full = std::any::type_name::<T>();
    let head = full.split('<').next().unwrap_or(full);
    head.rsplit("::").next().unwrap_or(head)
}
