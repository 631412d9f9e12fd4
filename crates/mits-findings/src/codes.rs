//! Static registry of every finding code the validator can emit.
//!
//! Codes have the fixed shape `CATEGORY:SUBCODE`, both halves uppercase ASCII
//! with underscores. Stages reference the constants in this module rather than
//! string literals so that a typo is a compile error instead of an unknown code.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::finding::Severity;
use crate::{Error, Result};

/// Owning category of a finding code
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Category {
    /// Input-shape problems detected before any stage runs
    Intake,
    /// Markup well-formedness
    #[serde(rename = "WELLFORMED")]
    WellFormed,
    /// Schema conformance
    Xsd,
    /// Business-rule assertions
    Schematron,
    /// Catalog cross-reference checks
    Semantic,
    /// Reference-data loading
    Catalog,
    /// Pipeline infrastructure
    Engine,
    /// Document acquisition over the network
    Network,
    /// URL intake
    Url,
}

impl Category {
    /// All categories in catalog order.
    pub const ALL: [Category; 9] = [
        Category::Intake,
        Category::WellFormed,
        Category::Xsd,
        Category::Schematron,
        Category::Semantic,
        Category::Catalog,
        Category::Engine,
        Category::Network,
        Category::Url,
    ];

    /// Code prefix for this category.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Category::Intake => "INTAKE",
            Category::WellFormed => "WELLFORMED",
            Category::Xsd => "XSD",
            Category::Schematron => "SCHEMATRON",
            Category::Semantic => "SEMANTIC",
            Category::Catalog => "CATALOG",
            Category::Engine => "ENGINE",
            Category::Network => "NETWORK",
            Category::Url => "URL",
        }
    }

    /// Category owning a `CATEGORY:SUBCODE` string, if the prefix is known.
    #[must_use]
    pub fn of_code(code: &str) -> Option<Category> {
        let (prefix, _) = code.split_once(':')?;
        prefix.parse().ok()
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Category {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Category::ALL
            .into_iter()
            .find(|c| c.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| Error::unknown_category(s))
    }
}

/// Static metadata for one finding code
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ErrorDefinition {
    /// Full `CATEGORY:SUBCODE` code
    pub code: &'static str,
    /// Default severity before profile overrides
    pub severity: Severity,
    /// Short title
    pub title: &'static str,
    /// What the finding means
    pub description: &'static str,
    /// How to fix it
    pub remediation: &'static str,
    /// Owning category
    pub category: Category,
}

pub const INTAKE_BOTH_INPUTS: &str = "INTAKE:BOTH_INPUTS";
pub const INTAKE_NO_INPUTS: &str = "INTAKE:NO_INPUTS";
pub const INTAKE_TOO_LARGE: &str = "INTAKE:TOO_LARGE";
pub const INTAKE_UNACCEPTABLE_CONTENT_TYPE: &str = "INTAKE:UNACCEPTABLE_CONTENT_TYPE";
pub const INTAKE_INVALID_URL: &str = "INTAKE:INVALID_URL";
pub const INTAKE_UNSUPPORTED_MEDIA_TYPE: &str = "INTAKE:UNSUPPORTED_MEDIA_TYPE";

pub const WELLFORMED_PARSE_ERROR: &str = "WELLFORMED:PARSE_ERROR";
pub const WELLFORMED_UNEXPECTED_ERROR: &str = "WELLFORMED:UNEXPECTED_ERROR";
pub const WELLFORMED_SUSPICIOUS_CONTENT_TYPE: &str = "WELLFORMED:SUSPICIOUS_CONTENT_TYPE";

pub const XSD_SCHEMA_MISSING: &str = "XSD:SCHEMA_MISSING";
pub const XSD_VALIDATION_ERROR: &str = "XSD:VALIDATION_ERROR";
pub const XSD_PARSE_ERROR: &str = "XSD:PARSE_ERROR";
pub const XSD_XML_PARSE_ERROR: &str = "XSD:XML_PARSE_ERROR";
pub const XSD_SCHEMA_PARSE_ERROR: &str = "XSD:SCHEMA_PARSE_ERROR";

pub const SCHEMATRON_RULES_MISSING: &str = "SCHEMATRON:RULES_MISSING";
pub const SCHEMATRON_NO_RULES_LOADED: &str = "SCHEMATRON:NO_RULES_LOADED";
pub const SCHEMATRON_RULE_FAILURE: &str = "SCHEMATRON:RULE_FAILURE";
pub const SCHEMATRON_VALIDATION_ERROR: &str = "SCHEMATRON:VALIDATION_ERROR";
pub const SCHEMATRON_XML_PARSE_ERROR: &str = "SCHEMATRON:XML_PARSE_ERROR";
pub const SCHEMATRON_RULES_PARSE_ERROR: &str = "SCHEMATRON:RULES_PARSE_ERROR";

pub const SEMANTIC_ENUM_UNKNOWN: &str = "SEMANTIC:ENUM_UNKNOWN";
pub const SEMANTIC_LIMIT_EXCEEDED: &str = "SEMANTIC:LIMIT_EXCEEDED";
pub const SEMANTIC_INCONSISTENT_TOTALS: &str = "SEMANTIC:INCONSISTENT_TOTALS";
pub const SEMANTIC_INVALID_CHARGE_CLASS: &str = "SEMANTIC:INVALID_CHARGE_CLASS";
pub const SEMANTIC_INVALID_PAYMENT_FREQUENCY: &str = "SEMANTIC:INVALID_PAYMENT_FREQUENCY";
pub const SEMANTIC_INVALID_REFUNDABILITY: &str = "SEMANTIC:INVALID_REFUNDABILITY";
pub const SEMANTIC_INVALID_TERM_BASIS: &str = "SEMANTIC:INVALID_TERM_BASIS";
pub const SEMANTIC_INCONSISTENT_RENT_REQUIREMENT: &str = "SEMANTIC:INCONSISTENT_RENT_REQUIREMENT";
pub const SEMANTIC_INCONSISTENT_DEPOSIT_FREQUENCY: &str = "SEMANTIC:INCONSISTENT_DEPOSIT_FREQUENCY";
pub const SEMANTIC_XML_PARSE_ERROR: &str = "SEMANTIC:XML_PARSE_ERROR";

pub const CATALOG_VERSION_NOT_FOUND: &str = "CATALOG:VERSION_NOT_FOUND";
pub const CATALOG_FILE_MISSING: &str = "CATALOG:FILE_MISSING";
pub const CATALOG_DIRECTORY_MISSING: &str = "CATALOG:DIRECTORY_MISSING";
pub const CATALOG_INVALID_JSON: &str = "CATALOG:INVALID_JSON";
pub const CATALOG_SCHEMA_VALIDATION_ERROR: &str = "CATALOG:SCHEMA_VALIDATION_ERROR";
pub const CATALOG_DUPLICATE_CODE: &str = "CATALOG:DUPLICATE_CODE";
pub const CATALOG_NO_ENUMS: &str = "CATALOG:NO_ENUMS";
pub const CATALOG_NO_SPECIALIZATIONS: &str = "CATALOG:NO_SPECIALIZATIONS";

pub const ENGINE_LEVEL_CRASH: &str = "ENGINE:LEVEL_CRASH";
pub const ENGINE_RULES_MISSING: &str = "ENGINE:RULES_MISSING";
pub const ENGINE_RESOURCE_LOAD_FAILED: &str = "ENGINE:RESOURCE_LOAD_FAILED";
pub const ENGINE_ASYNC_VALIDATION_FAILED: &str = "ENGINE:ASYNC_VALIDATION_FAILED";

pub const NETWORK_TIMEOUT: &str = "NETWORK:TIMEOUT";
pub const NETWORK_CONNECTION_ERROR: &str = "NETWORK:CONNECTION_ERROR";
pub const NETWORK_HTTP_STATUS: &str = "NETWORK:HTTP_STATUS";
pub const NETWORK_REQUEST_ERROR: &str = "NETWORK:REQUEST_ERROR";
pub const NETWORK_FETCH_ERROR: &str = "NETWORK:FETCH_ERROR";
pub const NETWORK_DNS_ERROR: &str = "NETWORK:DNS_ERROR";
pub const NETWORK_TOO_LARGE_DURING_STREAM: &str = "NETWORK:TOO_LARGE_DURING_STREAM";

pub const URL_INTAKE_ACKNOWLEDGED: &str = "URL:INTAKE_ACKNOWLEDGED";

const fn def(
    code: &'static str,
    severity: Severity,
    category: Category,
    title: &'static str,
    description: &'static str,
    remediation: &'static str,
) -> ErrorDefinition {
    ErrorDefinition {
        code,
        severity,
        title,
        description,
        remediation,
        category,
    }
}

use Category as C;
use Severity::{Error as E, Info as I, Warning as W};

#[rustfmt::skip]
static CATALOG: &[ErrorDefinition] = &[
    def(INTAKE_BOTH_INPUTS, E, C::Intake, "Both inputs provided",
        "A file upload and a URL were both supplied.",
        "Provide either a file or a URL, not both."),
    def(INTAKE_NO_INPUTS, E, C::Intake, "No input provided",
        "Neither a file nor a URL was supplied.",
        "Provide a file or a URL to validate."),
    def(INTAKE_TOO_LARGE, E, C::Intake, "Input too large",
        "The input exceeds the maximum size allowed by the active profile.",
        "Reduce the document size or use a profile with a higher limit."),
    def(INTAKE_UNACCEPTABLE_CONTENT_TYPE, E, C::Intake, "Unacceptable content type",
        "The declared content type is not accepted by the active profile.",
        "Send the document as application/xml or text/xml."),
    def(INTAKE_INVALID_URL, E, C::Intake, "Invalid URL",
        "The supplied URL could not be parsed or uses an unsupported scheme.",
        "Provide an absolute http or https URL."),
    def(INTAKE_UNSUPPORTED_MEDIA_TYPE, E, C::Intake, "Unsupported media type",
        "The request media type is not supported.",
        "Use a supported media type for the request."),

    def(WELLFORMED_PARSE_ERROR, E, C::WellFormed, "Malformed XML",
        "The document is not well-formed XML.",
        "Fix the markup at the reported line and column."),
    def(WELLFORMED_UNEXPECTED_ERROR, E, C::WellFormed, "Unexpected parser failure",
        "The parser failed for a reason other than malformed markup.",
        "Check the document encoding and retry."),
    def(WELLFORMED_SUSPICIOUS_CONTENT_TYPE, W, C::WellFormed, "Suspicious content type",
        "The declared content type does not look like an XML media type.",
        "Declare the document as application/xml or text/xml."),

    def(XSD_SCHEMA_MISSING, I, C::Xsd, "Schema not available",
        "No XSD schema is installed for the active catalog version; schema checks were skipped.",
        "Install the schema under the version's xsd directory to enable schema checks."),
    def(XSD_VALIDATION_ERROR, E, C::Xsd, "Schema violation",
        "The document does not conform to the XSD schema.",
        "Correct the element or value at the reported location."),
    def(XSD_PARSE_ERROR, E, C::Xsd, "Schema stage parse failure",
        "The schema stage could not process the document.",
        "Fix well-formedness errors first."),
    def(XSD_XML_PARSE_ERROR, E, C::Xsd, "Document parse failure during schema check",
        "The document could not be parsed for schema validation.",
        "Fix well-formedness errors first."),
    def(XSD_SCHEMA_PARSE_ERROR, E, C::Xsd, "Schema could not be loaded",
        "The installed XSD schema is malformed or uses unsupported constructs.",
        "Repair the schema file for the active catalog version."),

    def(SCHEMATRON_RULES_MISSING, W, C::Schematron, "Business rules not available",
        "No business-rule file is installed for the active catalog version.",
        "Install the rule file under the version's schematron directory."),
    def(SCHEMATRON_NO_RULES_LOADED, I, C::Schematron, "No business rules loaded",
        "Business-rule checks were skipped because no rule file is installed.",
        "Install the rule file to enable business-rule checks."),
    def(SCHEMATRON_RULE_FAILURE, E, C::Schematron, "Business rule violated",
        "A business-rule assertion did not hold for the document.",
        "Correct the document so the reported rule is satisfied."),
    def(SCHEMATRON_VALIDATION_ERROR, E, C::Schematron, "Business rule could not be evaluated",
        "A business-rule test failed to evaluate against the document.",
        "Check the rule expression and the document structure it targets."),
    def(SCHEMATRON_XML_PARSE_ERROR, E, C::Schematron, "Document parse failure during rule check",
        "The document could not be parsed for business-rule validation.",
        "Fix well-formedness errors first."),
    def(SCHEMATRON_RULES_PARSE_ERROR, E, C::Schematron, "Business rules could not be loaded",
        "The installed rule file is malformed or contains an invalid test expression.",
        "Repair the rule file for the active catalog version."),

    def(SEMANTIC_ENUM_UNKNOWN, E, C::Semantic, "Unknown enumeration value",
        "A value is not a member of its controlled vocabulary.",
        "Use a code listed in the catalog."),
    def(SEMANTIC_LIMIT_EXCEEDED, E, C::Semantic, "Limit exceeded",
        "A value exceeds a catalog-defined limit.",
        "Bring the value within the documented limit."),
    def(SEMANTIC_INCONSISTENT_TOTALS, E, C::Semantic, "Inconsistent totals",
        "Declared totals do not match the sum of their parts.",
        "Recompute the totals."),
    def(SEMANTIC_INVALID_CHARGE_CLASS, E, C::Semantic, "Invalid charge classification",
        "The charge classification is not present in the charge-class catalog.",
        "Use a charge class code or alias from the catalog."),
    def(SEMANTIC_INVALID_PAYMENT_FREQUENCY, E, C::Semantic, "Invalid payment frequency",
        "The payment frequency is not present in the payment-frequency catalog.",
        "Use a payment frequency code or alias from the catalog."),
    def(SEMANTIC_INVALID_REFUNDABILITY, E, C::Semantic, "Invalid refundability",
        "The refundability value is not present in the refundability catalog.",
        "Use a refundability code or alias from the catalog."),
    def(SEMANTIC_INVALID_TERM_BASIS, E, C::Semantic, "Invalid term basis",
        "The term basis is not present in the term-basis catalog.",
        "Use a term basis code or alias from the catalog."),
    def(SEMANTIC_INCONSISTENT_RENT_REQUIREMENT, W, C::Semantic, "Optional rent charge",
        "A rent charge is declared as optional.",
        "Rent is normally mandatory; check the Requirement value."),
    def(SEMANTIC_INCONSISTENT_DEPOSIT_FREQUENCY, W, C::Semantic, "Recurring deposit",
        "A deposit charge is not declared as a one-time payment.",
        "Deposits are normally one-time; check the PaymentFrequency value."),
    def(SEMANTIC_XML_PARSE_ERROR, E, C::Semantic, "Document parse failure during semantic check",
        "The document could not be parsed for semantic validation.",
        "Fix well-formedness errors first."),

    def(CATALOG_VERSION_NOT_FOUND, E, C::Catalog, "Catalog version not found",
        "No rules directory exists for the requested catalog version.",
        "Install the catalog version or select an existing one."),
    def(CATALOG_FILE_MISSING, W, C::Catalog, "Catalog file missing",
        "An expected catalog file is absent; the registry is partially populated.",
        "Restore the missing catalog file."),
    def(CATALOG_DIRECTORY_MISSING, W, C::Catalog, "Catalog directory missing",
        "An expected catalog directory is absent.",
        "Restore the missing catalog directory."),
    def(CATALOG_INVALID_JSON, E, C::Catalog, "Invalid catalog JSON",
        "A catalog file could not be parsed; it was skipped.",
        "Fix the JSON syntax of the reported file."),
    def(CATALOG_SCHEMA_VALIDATION_ERROR, E, C::Catalog, "Catalog schema violation",
        "A catalog file does not match its structural schema; it was skipped.",
        "Fix the reported field so the file matches its schema."),
    def(CATALOG_DUPLICATE_CODE, E, C::Catalog, "Duplicate catalog code",
        "A code appears more than once in one catalog file; the first occurrence was kept.",
        "Remove or rename the duplicate entry."),
    def(CATALOG_NO_ENUMS, I, C::Catalog, "No enum catalogs",
        "The enums directory contains no catalog files.",
        "Add enum catalog files if enum checks are required."),
    def(CATALOG_NO_SPECIALIZATIONS, I, C::Catalog, "No item specializations",
        "The item-specializations directory contains no catalog files.",
        "Add specialization files if they are required."),

    def(ENGINE_LEVEL_CRASH, E, C::Engine, "Validation stage crashed",
        "A validation stage failed unexpectedly; other stages still ran.",
        "Report the failure together with the input document."),
    def(ENGINE_RULES_MISSING, W, C::Engine, "Validation stage unavailable",
        "A stage enabled by the profile is not registered with the validator.",
        "Remove the stage from the profile or install its implementation."),
    def(ENGINE_RESOURCE_LOAD_FAILED, W, C::Engine, "Resource load failed",
        "Reference data required by a stage could not be loaded; its checks were skipped.",
        "Check the catalog installation for the active version."),
    def(ENGINE_ASYNC_VALIDATION_FAILED, E, C::Engine, "Concurrent validation failed",
        "A validation task failed before producing a result.",
        "Retry the validation; report the failure if it persists."),

    def(NETWORK_TIMEOUT, E, C::Network, "Fetch timed out",
        "The remote document could not be fetched within the time limit.",
        "Retry later or supply the document directly."),
    def(NETWORK_CONNECTION_ERROR, E, C::Network, "Connection failed",
        "A connection to the remote host could not be established.",
        "Check that the host is reachable."),
    def(NETWORK_HTTP_STATUS, E, C::Network, "Unexpected HTTP status",
        "The remote server answered with a non-success status.",
        "Check the URL and the server's availability."),
    def(NETWORK_REQUEST_ERROR, E, C::Network, "Request failed",
        "The fetch request could not be completed.",
        "Check the URL and retry."),
    def(NETWORK_FETCH_ERROR, E, C::Network, "Fetch failed",
        "The remote document could not be retrieved.",
        "Retry or supply the document directly."),
    def(NETWORK_DNS_ERROR, E, C::Network, "Host not found",
        "The remote host name could not be resolved.",
        "Check the host name in the URL."),
    def(NETWORK_TOO_LARGE_DURING_STREAM, E, C::Network, "Remote document too large",
        "The remote document exceeded the size limit while streaming.",
        "Reduce the document size or use a profile with a higher limit."),

    def(URL_INTAKE_ACKNOWLEDGED, I, C::Url, "URL accepted",
        "The URL was accepted for fetching.",
        "No action needed."),
];

/// Look up the static definition of a finding code.
#[must_use]
pub fn lookup(code: &str) -> Option<&'static ErrorDefinition> {
    CATALOG.iter().find(|d| d.code == code)
}

/// Every known definition, in catalog order.
#[must_use]
pub fn definitions() -> &'static [ErrorDefinition] {
    CATALOG
}

/// Definitions owned by one category.
pub fn by_category(category: Category) -> impl Iterator<Item = &'static ErrorDefinition> {
    CATALOG.iter().filter(move |d| d.category == category)
}

/// Whether `code` has the `UPPERCASE_CATEGORY:UPPERCASE_SUBCODE` shape.
#[must_use]
pub fn is_well_formed_code(code: &str) -> bool {
    let upper = |s: &str| {
        !s.is_empty()
            && s.starts_with(|c: char| c.is_ascii_uppercase())
            && s.chars().all(|c| c.is_ascii_uppercase() || c.is_ascii_digit() || c == '_')
    };
    match code.split_once(':') {
        Some((category, subcode)) => upper(category) && upper(subcode),
        None => false,
    }
}
