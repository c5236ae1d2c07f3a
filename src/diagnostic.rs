use crate::span::Span;

/// A translation diagnostic pointing at the offending kernel-body span.
#[derive(Clone, Debug, PartialEq)]
pub struct Diagnostic {
    pub severity: Severity,
    pub message: String,
    pub span: Span,
    pub notes: Vec<String>,
    pub help: Option<String>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Severity {
    Error,
    Warning,
}

impl Diagnostic {
    pub fn error(message: impl Into<String>, span: Span) -> Self {
        Self {
            severity: Severity::Error,
            message: message.into(),
            span,
            notes: Vec::new(),
            help: None,
        }
    }

    pub fn warning(message: impl Into<String>, span: Span) -> Self {
        Self {
            severity: Severity::Warning,
            message: message.into(),
            span,
            notes: Vec::new(),
            help: None,
        }
    }

    pub fn with_note(mut self, note: impl Into<String>) -> Self {
        self.notes.push(note.into());
        self
    }

    pub fn with_help(mut self, help: impl Into<String>) -> Self {
        self.help = Some(help.into());
        self
    }

    /// Render the diagnostic against the host source it was extracted from,
    /// using ariadne. Returns the rendered report (no ANSI colors).
    pub fn render(&self, filename: &str, source: &str) -> String {
        use ariadne::{Config, Label, Report, ReportKind, Source};

        let kind = match self.severity {
            Severity::Error => ReportKind::Error,
            Severity::Warning => ReportKind::Warning,
        };

        // Spans past the end of the text (stale extractor output) clamp to it.
        let end = (self.span.end as usize).min(source.len());
        let start = (self.span.start as usize).min(end);

        let mut report = Report::build(kind, filename, start)
            .with_config(Config::default().with_color(false))
            .with_message(&self.message)
            .with_label(Label::new((filename, start..end)).with_message(&self.message));

        for note in &self.notes {
            report = report.with_note(note);
        }

        if let Some(help) = &self.help {
            report = report.with_help(help);
        }

        let mut out = Vec::new();
        if report
            .finish()
            .write((filename, Source::from(source)), &mut out)
            .is_err()
        {
            return self.to_string();
        }
        String::from_utf8_lossy(&out).into_owned()
    }
}

impl std::fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} (at {})", self.message, self.span)?;
        for note in &self.notes {
            write!(f, "; note: {}", note)?;
        }
        if let Some(help) = &self.help {
            write!(f, "; help: {}", help)?;
        }
        Ok(())
    }
}

/// Render a list of diagnostics, one report after another.
pub fn render_diagnostics(diagnostics: &[Diagnostic], filename: &str, source: &str) -> String {
    diagnostics
        .iter()
        .map(|d| d.render(filename, source))
        .collect::<Vec<_>>()
        .join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_construction() {
        let span = Span::new(0, 10, 15);
        let d = Diagnostic::error("unsupported node", span);
        assert_eq!(d.severity, Severity::Error);
        assert_eq!(d.message, "unsupported node");
        assert_eq!(d.span.start, 10);
        assert_eq!(d.span.end, 15);
        assert!(d.notes.is_empty());
        assert!(d.help.is_none());
    }

    #[test]
    fn test_chained_builders() {
        let d = Diagnostic::warning("shadowed capture", Span::new(0, 0, 5))
            .with_note("note 1")
            .with_help("rename the local")
            .with_note("note 2");
        assert_eq!(d.severity, Severity::Warning);
        assert_eq!(d.notes, vec!["note 1".to_string(), "note 2".to_string()]);
        assert_eq!(d.help.as_deref(), Some("rename the local"));
    }

    #[test]
    fn test_display_names_span() {
        let d = Diagnostic::error("type `Foo` has no dialect equivalent", Span::new(1, 4, 7))
            .with_help("use a scalar or vector type");
        let text = d.to_string();
        assert!(text.contains("1:4..7"));
        assert!(text.contains("help: use a scalar or vector type"));
    }

    #[test]
    fn test_render_contains_message() {
        let source = "let x = new Foo(1);\n";
        let d = Diagnostic::error("type `Foo` has no dialect equivalent", Span::new(0, 12, 15));
        let rendered = d.render("kernel.rs", source);
        assert!(rendered.contains("type `Foo` has no dialect equivalent"));
        assert!(rendered.contains("kernel.rs"));
    }

    #[test]
    fn test_render_clamps_stale_span() {
        let d = Diagnostic::error("out of range", Span::new(0, 2, 90));
        let rendered = d.render("kernel.rs", "short\n");
        assert!(rendered.contains("out of range"));
    }

    #[test]
    fn test_render_diagnostics_multiple() {
        let source = "a + b;\nc + d;\n";
        let diagnostics = vec![
            Diagnostic::warning("first", Span::new(0, 0, 1)),
            Diagnostic::warning("second", Span::new(0, 7, 8)),
        ];
        let rendered = render_diagnostics(&diagnostics, "kernel.rs", source);
        assert!(rendered.contains("first"));
        assert!(rendered.contains("second"));
    }
}
