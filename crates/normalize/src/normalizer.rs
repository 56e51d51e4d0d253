use crate::canonicalize::uri_to_path;
use crate::native::{NativeRecord, PropertyRecord, VerificationDocument};
use crate::severity_map::{NativeSeverity, SeverityScheme};
use codecity_model::{
    Category, Confidence, EntityKind, EntityRef, FindingKind, Severity, Verdict,
};
use serde_json::Value;
use std::collections::HashMap;

/// A finding before its path is canonicalized and its id assigned.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DraftFinding {
    pub kind: FindingKind,
    pub category: Category,
    pub sub_kind: Option<String>,
    pub severity: Severity,
    pub confidence: Confidence,
    /// Path exactly as the tool reported it.
    pub raw_path: Option<String>,
    pub line: Option<u32>,
    pub end_line: Option<u32>,
    pub entity: Option<EntityRef>,
    pub rule_key: Option<String>,
    pub message: String,
    pub effort_minutes: Option<u32>,
    pub tags: Vec<String>,
    pub verdict: Option<Verdict>,
}

#[derive(Debug, Default)]
pub struct Drafts {
    pub findings: Vec<DraftFinding>,
    /// Native items that did not match the accepted shape.
    pub rejected: usize,
}

/// One normalizer per adapter family. Parsing of tool-shaped data happens
/// here and nowhere else; malformed items are counted, never raised.
pub trait Normalizer {
    type Native: ?Sized;

    fn family(&self) -> &'static str;

    fn normalize(&self, native: &Self::Native, scheme: SeverityScheme, out: &mut Drafts);
}

fn parse_kind(raw: Option<&str>, category: Category) -> FindingKind {
    match raw.map(|k| k.trim().to_ascii_lowercase()).as_deref() {
        Some("vulnerability" | "vuln") => FindingKind::Vulnerability,
        Some("verification" | "property") => FindingKind::Verification,
        Some("hotspot" | "security_hotspot" | "security-hotspot") => FindingKind::Hotspot,
        Some("issue" | "bug" | "code_smell" | "code-smell") => FindingKind::Issue,
        _ if category == Category::Security => FindingKind::Vulnerability,
        _ => FindingKind::Issue,
    }
}

fn parse_verdict(raw: &str) -> Verdict {
    match raw.trim().to_ascii_lowercase().as_str() {
        "verified" | "proved" | "proven" | "pass" | "passed" | "holds" => Verdict::Verified,
        "violated" | "failed" | "fail" | "counterexample" | "refuted" => Verdict::Violated,
        "partial" | "bounded" => Verdict::Partial,
        _ => Verdict::Unknown,
    }
}

fn parse_entity_kind(raw: Option<&str>) -> EntityKind {
    match raw.map(|k| k.trim().to_ascii_lowercase()).as_deref() {
        Some("class" | "struct" | "interface" | "trait") => EntityKind::Class,
        Some("contract" | "library") => EntityKind::Contract,
        Some("module" | "package" | "namespace") => EntityKind::Module,
        _ => EntityKind::Function,
    }
}

fn capped(confidence: Confidence, cap: Option<Confidence>) -> Confidence {
    match cap {
        Some(cap) if cap < confidence => cap,
        _ => confidence,
    }
}

fn sub_kind_of(raw: Option<&str>) -> Option<String> {
    raw.map(|s| s.trim().to_ascii_lowercase().replace([' ', '_'], "-"))
        .filter(|s| !s.is_empty())
}

/// Normalizer for the generic record schema.
pub struct RecordNormalizer;

impl Normalizer for RecordNormalizer {
    type Native = [NativeRecord];

    fn family(&self) -> &'static str {
        "records"
    }

    fn normalize(&self, records: &[NativeRecord], scheme: SeverityScheme, out: &mut Drafts) {
        for record in records {
            if record.message.trim().is_empty() {
                out.rejected += 1;
                continue;
            }
            let category = record
                .category
                .as_deref()
                .map(Category::parse_lossy)
                .unwrap_or(Category::Other);
            let (severity, cap) = scheme.resolve(record.severity.as_ref());
            let confidence = record
                .confidence
                .as_deref()
                .and_then(|c| c.parse::<Confidence>().ok())
                .unwrap_or(Confidence::Medium);
            let entity = record.entity.as_ref().map(|name| EntityRef {
                kind: parse_entity_kind(record.entity_kind.as_deref()),
                name: name.clone(),
            });

            out.findings.push(DraftFinding {
                kind: parse_kind(record.kind.as_deref(), category),
                category,
                sub_kind: sub_kind_of(record.sub_kind.as_deref()),
                severity,
                confidence: capped(confidence, cap),
                raw_path: record.file.clone(),
                line: record.line,
                end_line: record.end_line,
                entity,
                rule_key: record.rule.clone(),
                message: record.message.clone(),
                effort_minutes: record.effort_minutes,
                tags: record.tags.clone(),
                verdict: record.verdict.as_deref().map(parse_verdict),
            });
        }
    }
}

/// Normalizer for formal verification result documents. `verified` and
/// `violated` outcomes carry `confidence = proof`; `partial` stays partial.
pub struct VerificationNormalizer;

impl VerificationNormalizer {
    fn property(property: &PropertyRecord, tool: Option<&str>, scheme: SeverityScheme) -> DraftFinding {
        let verdict = parse_verdict(&property.status);
        let category = property
            .category
            .as_deref()
            .map(Category::parse_lossy)
            .unwrap_or(Category::Security);

        let declared = property.severity.as_ref().and_then(|s| scheme.map(s));
        let (severity, confidence) = match verdict {
            Verdict::Violated => (declared.unwrap_or(Severity::High), Confidence::Proof),
            Verdict::Verified => (Severity::Info, Confidence::Proof),
            Verdict::Partial => (
                declared.map_or(Severity::Low, |s| s.min(Severity::Medium)),
                Confidence::Medium,
            ),
            Verdict::Unknown => (Severity::Info, Confidence::Low),
        };

        let message = property.message.clone().unwrap_or_else(|| {
            let status = match verdict {
                Verdict::Verified => "verified",
                Verdict::Violated => "violated",
                Verdict::Partial => "partially verified",
                Verdict::Unknown => "inconclusive",
            };
            match tool {
                Some(tool) => format!("{tool}: property {} {status}", property.name),
                None => format!("property {} {status}", property.name),
            }
        });

        DraftFinding {
            kind: FindingKind::Verification,
            category,
            sub_kind: sub_kind_of(Some(&property.kind)),
            severity,
            confidence,
            raw_path: property.file.clone(),
            line: property.line,
            end_line: None,
            entity: None,
            rule_key: Some(property.name.clone()),
            message,
            effort_minutes: None,
            tags: Vec::new(),
            verdict: Some(verdict),
        }
    }
}

impl Normalizer for VerificationNormalizer {
    type Native = [VerificationDocument];

    fn family(&self) -> &'static str {
        "verification"
    }

    fn normalize(&self, docs: &[VerificationDocument], scheme: SeverityScheme, out: &mut Drafts) {
        for doc in docs {
            for property in &doc.properties {
                if property.name.trim().is_empty() || property.kind.trim().is_empty() {
                    out.rejected += 1;
                    continue;
                }
                out.findings
                    .push(Self::property(property, doc.tool.as_deref(), scheme));
            }
        }
    }
}

/// Normalizer for SARIF 2.1 logs. Result `level` (or the rule's default
/// level) maps through the `sarif` scheme unless a numeric
/// `security-severity` property is present, which maps through `cvss`.
pub struct SarifNormalizer;

fn str_at<'a>(value: &'a Value, pointer: &str) -> Option<&'a str> {
    value.pointer(pointer).and_then(Value::as_str)
}

fn u32_at(value: &Value, pointer: &str) -> Option<u32> {
    value
        .pointer(pointer)
        .and_then(Value::as_u64)
        .and_then(|v| u32::try_from(v).ok())
}

fn score_at(value: &Value, pointer: &str) -> Option<f64> {
    match value.pointer(pointer)? {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn tags_at(value: &Value, pointer: &str) -> Vec<String> {
    value
        .pointer(pointer)
        .and_then(Value::as_array)
        .map(|tags| {
            tags.iter()
                .filter_map(Value::as_str)
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default()
}

impl SarifNormalizer {
    fn run(run: &Value, out: &mut Drafts) {
        let Some(results) = run.get("results").and_then(Value::as_array) else {
            return;
        };
        let tool = str_at(run, "/tool/driver/name");
        let rules: Vec<&Value> = run
            .pointer("/tool/driver/rules")
            .and_then(Value::as_array)
            .map(|rules| rules.iter().collect())
            .unwrap_or_default();
        let by_id: HashMap<&str, &Value> = rules
            .iter()
            .filter_map(|rule| Some((rule.get("id")?.as_str()?, *rule)))
            .collect();
        let base_uris: HashMap<&str, &str> = run
            .get("originalUriBaseIds")
            .and_then(Value::as_object)
            .map(|bases| {
                bases
                    .iter()
                    .filter_map(|(k, v)| Some((k.as_str(), v.get("uri")?.as_str()?)))
                    .collect()
            })
            .unwrap_or_default();

        for result in results {
            let rule_id = str_at(result, "/ruleId").or_else(|| str_at(result, "/rule/id"));
            let rule = rule_id
                .and_then(|id| by_id.get(id).copied())
                .or_else(|| {
                    let idx = result.get("ruleIndex")?.as_u64()?;
                    rules.get(usize::try_from(idx).ok()?).copied()
                });

            let message = str_at(result, "/message/text")
                .or_else(|| rule.and_then(|r| str_at(r, "/shortDescription/text")))
                .or(rule_id)
                .map(str::to_string);
            let Some(message) = message.filter(|m| !m.trim().is_empty()) else {
                out.rejected += 1;
                continue;
            };

            let security_score = score_at(result, "/properties/security-severity")
                .or_else(|| rule.and_then(|r| score_at(r, "/properties/security-severity")));
            let level = str_at(result, "/level")
                .or_else(|| rule.and_then(|r| str_at(r, "/defaultConfiguration/level")));
            let (severity, cap) = match security_score {
                Some(score) => SeverityScheme::Cvss.resolve(Some(&NativeSeverity::Score(score))),
                None => SeverityScheme::Sarif.resolve(level.map(NativeSeverity::from).as_ref()),
            };

            let mut tags = rule.map(|r| tags_at(r, "/properties/tags")).unwrap_or_default();
            for tag in tags_at(result, "/properties/tags") {
                if !tags.contains(&tag) {
                    tags.push(tag);
                }
            }

            let explicit_category = str_at(result, "/properties/category")
                .or_else(|| rule.and_then(|r| str_at(r, "/properties/category")));
            let category = match explicit_category {
                Some(raw) => Category::parse_lossy(raw),
                None if security_score.is_some()
                    || tags.iter().any(|t| t.eq_ignore_ascii_case("security")) =>
                {
                    Category::Security
                }
                None => tags
                    .iter()
                    .map(|t| Category::parse_lossy(t))
                    .find(|c| *c != Category::Other)
                    .unwrap_or(Category::Other),
            };
            let sub_kind = str_at(result, "/properties/sub_kind")
                .or_else(|| rule.and_then(|r| str_at(r, "/properties/sub_kind")));

            let precision = str_at(result, "/properties/precision")
                .or_else(|| rule.and_then(|r| str_at(r, "/properties/precision")));
            let confidence = match precision {
                Some("very-high" | "high") => Confidence::High,
                Some("low") => Confidence::Low,
                _ => Confidence::Medium,
            };

            let physical = result.pointer("/locations/0/physicalLocation");
            let raw_path = physical.and_then(|p| {
                let uri = str_at(p, "/artifactLocation/uri")?;
                let joined = str_at(p, "/artifactLocation/uriBaseId")
                    .and_then(|base| base_uris.get(base))
                    .map(|base| format!("{}/{}", base.trim_end_matches('/'), uri))
                    .unwrap_or_else(|| uri.to_string());
                Some(uri_to_path(&joined))
            });
            let line = physical.and_then(|p| u32_at(p, "/region/startLine"));
            let end_line = physical.and_then(|p| u32_at(p, "/region/endLine"));
            let entity = str_at(result, "/locations/0/logicalLocations/0/name").map(|name| {
                EntityRef {
                    kind: parse_entity_kind(str_at(
                        result,
                        "/locations/0/logicalLocations/0/kind",
                    )),
                    name: name.to_string(),
                }
            });

            let mut message = message;
            if let Some(tool) = tool {
                if !message.starts_with(tool) && rule_id.is_none() {
                    message = format!("{tool}: {message}");
                }
            }

            out.findings.push(DraftFinding {
                kind: parse_kind(None, category),
                category,
                sub_kind: sub_kind_of(sub_kind),
                severity,
                confidence: capped(confidence, cap),
                raw_path,
                line,
                end_line: end_line.filter(|end| line.is_some_and(|start| *end >= start)),
                entity,
                rule_key: rule_id.map(str::to_string),
                message,
                effort_minutes: None,
                tags,
                verdict: None,
            });
        }
    }
}

impl Normalizer for SarifNormalizer {
    type Native = [Value];

    fn family(&self) -> &'static str {
        "sarif"
    }

    fn normalize(&self, docs: &[Value], _scheme: SeverityScheme, out: &mut Drafts) {
        for doc in docs {
            match doc.get("runs").and_then(Value::as_array) {
                Some(runs) => {
                    for run in runs {
                        Self::run(run, out);
                    }
                }
                None => out.rejected += 1,
            }
        }
    }
}
