//! Well-formedness stage

use mits_adapter_xml::{XmlParser, is_markup_content_type};
use mits_findings::{Finding, Location, codes};
use tracing::debug;

use crate::Result;
use crate::stage::{Stage, StageInput, StageKind};

/// Confirms the input parses as well-formed markup.
///
/// Reports at most one parse error. The declared content type is advisory:
/// a non-markup type only adds a warning.
#[derive(Debug, Clone, Default)]
pub struct WellFormedStage {
    parser: XmlParser,
}

impl WellFormedStage {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_parser(parser: XmlParser) -> Self {
        Self { parser }
    }
}

impl Stage for WellFormedStage {
    fn kind(&self) -> StageKind {
        StageKind::WellFormed
    }

    fn validate(&self, input: &StageInput<'_>) -> Result<Vec<Finding>> {
        let mut findings = Vec::new();

        if let Some(content_type) = input.content_type.filter(|ct| !is_markup_content_type(ct)) {
            findings.push(
                Finding::new(
                    codes::WELLFORMED_SUSPICIOUS_CONTENT_TYPE,
                    format!("Content type '{content_type}' does not look like XML"),
                )
                .with_location(Location::default().with_value(content_type)),
            );
        }

        // A tree handed in by the caller already passed the parser.
        if input.document.is_some() {
            return Ok(findings);
        }

        if let Err(e) = self.parser.parse(input.bytes) {
            let (line, column) = e.line_column();
            debug!(line, column, error = %e, "document is not well-formed");
            findings.push(
                Finding::new(codes::WELLFORMED_PARSE_ERROR, e.message())
                    .with_location(Location::at(line, column)),
            );
        }
        Ok(findings)
    }
}
