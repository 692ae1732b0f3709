//! Structured parsing of CLI output with TextFSM templates.
//!
//! [`OutputParser`] resolves a template through a [`TemplateIndex`] and runs
//! it over raw command output. Parsing never fails from the caller's point
//! of view: a missing or broken template, or a template yielding no
//! records, falls back to the raw text.
//!
//! # Example
//!
//! ```rust
//! use netauto::parse::{OutputParser, Parsed};
//!
//! let output = "Interface   IP-Address  OK? Method Status  Protocol\n\
//!               Loopback0   1.1.1.1     YES manual up      up\n";
//! match OutputParser::builtin().parse(output, "show ip int brief", "cisco_ios") {
//!     Parsed::Rows(rows) => assert_eq!(rows[0]["intf"].as_str(), Some("Loopback0")),
//!     Parsed::Raw(_) => unreachable!(),
//! }
//! ```

mod engine;
mod index;
mod template;

use std::borrow::Cow;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use indexmap::IndexMap;
use log::{debug, warn};
use serde::ser::{SerializeSeq, Serializer};
use serde::Serialize;

pub use engine::{FieldValue, ParsedRow};
pub use index::{IndexEntry, TemplateIndex};
pub use template::{LineOp, RecordOp, Rule, Template, ValueDef, ValueOptions};

use crate::error::TemplateError;

/// Name of the index file inside a template directory.
pub const INDEX_FILE: &str = "index";

const BUILTIN_INDEX: &str = include_str!("../../templates/index");

const BUILTIN_TEMPLATES: &[(&str, &str)] = &[
    (
        "cisco_ios_show_version.textfsm",
        include_str!("../../templates/cisco_ios_show_version.textfsm"),
    ),
    (
        "cisco_ios_show_ip_interface_brief.textfsm",
        include_str!("../../templates/cisco_ios_show_ip_interface_brief.textfsm"),
    ),
    (
        "cisco_ios_show_vlan_brief.textfsm",
        include_str!("../../templates/cisco_ios_show_vlan_brief.textfsm"),
    ),
    (
        "cisco_nxos_show_version.textfsm",
        include_str!("../../templates/cisco_nxos_show_version.textfsm"),
    ),
    (
        "cisco_nxos_show_interface_brief.textfsm",
        include_str!("../../templates/cisco_nxos_show_interface_brief.textfsm"),
    ),
    (
        "cisco_asa_show_version.textfsm",
        include_str!("../../templates/cisco_asa_show_version.textfsm"),
    ),
    (
        "cisco_wlc_ssh_show_sysinfo.textfsm",
        include_str!("../../templates/cisco_wlc_ssh_show_sysinfo.textfsm"),
    ),
    (
        "cisco_wlc_ssh_show_interface_summary.textfsm",
        include_str!("../../templates/cisco_wlc_ssh_show_interface_summary.textfsm"),
    ),
    (
        "arista_eos_show_version.textfsm",
        include_str!("../../templates/arista_eos_show_version.textfsm"),
    ),
    (
        "arista_eos_show_interfaces_description.textfsm",
        include_str!("../../templates/arista_eos_show_interfaces_description.textfsm"),
    ),
    (
        "f5_tmos_show_sys_version.textfsm",
        include_str!("../../templates/f5_tmos_show_sys_version.textfsm"),
    ),
    (
        "f5_tmos_show_sys_software_status.textfsm",
        include_str!("../../templates/f5_tmos_show_sys_software_status.textfsm"),
    ),
    (
        "juniper_junos_show_version.textfsm",
        include_str!("../../templates/juniper_junos_show_version.textfsm"),
    ),
    (
        "juniper_junos_show_interfaces_terse.textfsm",
        include_str!("../../templates/juniper_junos_show_interfaces_terse.textfsm"),
    ),
];

static BUILTIN: LazyLock<OutputParser> = LazyLock::new(|| {
    let index = TemplateIndex::parse_str(BUILTIN_INDEX).unwrap_or_else(|e| {
        warn!("built-in template index unusable: {}", e);
        TemplateIndex::default()
    });
    OutputParser {
        index,
        source: TemplateSource::Builtin,
    }
});

#[derive(Debug, Clone)]
enum TemplateSource {
    Builtin,
    Directory(PathBuf),
}

/// Result of parsing one command's output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Parsed {
    Rows(Vec<ParsedRow>),

    /// The unparsed text. Serializes as a one-element list.
    Raw(String),
}

impl Parsed {
    pub fn rows(&self) -> Option<&[ParsedRow]> {
        match self {
            Parsed::Rows(rows) => Some(rows),
            Parsed::Raw(_) => None,
        }
    }

    pub fn is_raw(&self) -> bool {
        matches!(self, Parsed::Raw(_))
    }
}

impl Serialize for Parsed {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Parsed::Rows(rows) => rows.serialize(serializer),
            Parsed::Raw(text) => {
                let mut seq = serializer.serialize_seq(Some(1))?;
                seq.serialize_element(text)?;
                seq.end()
            }
        }
    }
}

/// Parsed output of one device in a batch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DeviceResponse {
    pub device: String,
    pub response: Parsed,
}

/// Template-driven output parser.
#[derive(Debug, Clone)]
pub struct OutputParser {
    index: TemplateIndex,
    source: TemplateSource,
}

impl OutputParser {
    /// Parser over the templates shipped with this crate.
    pub fn builtin() -> &'static OutputParser {
        &BUILTIN
    }

    /// Load an index file; templates are read from the same directory.
    pub fn load(index_path: &Path) -> Result<Self, TemplateError> {
        let index = TemplateIndex::load(index_path)?;
        let dir = index_path
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_default();
        Ok(Self {
            index,
            source: TemplateSource::Directory(dir),
        })
    }

    /// Load `index_file` from `template_dir`.
    pub fn from_dir(template_dir: &Path, index_file: &str) -> Result<Self, TemplateError> {
        let index = TemplateIndex::load(&template_dir.join(index_file))?;
        Ok(Self {
            index,
            source: TemplateSource::Directory(template_dir.to_path_buf()),
        })
    }

    pub fn index(&self) -> &TemplateIndex {
        &self.index
    }

    fn template_text(&self, name: &str) -> Result<Cow<'static, str>, TemplateError> {
        match &self.source {
            TemplateSource::Builtin => BUILTIN_TEMPLATES
                .iter()
                .find(|(file, _)| *file == name)
                .map(|(_, text)| Cow::Borrowed(*text))
                .ok_or_else(|| TemplateError::Io {
                    path: PathBuf::from(name),
                    source: std::io::ErrorKind::NotFound.into(),
                }),
            TemplateSource::Directory(dir) => {
                let path = dir.join(name);
                std::fs::read_to_string(&path)
                    .map(Cow::Owned)
                    .map_err(|source| TemplateError::Io { path, source })
            }
        }
    }

    /// Parse strictly, reporting why no rows could be produced.
    pub fn try_parse(
        &self,
        raw: &str,
        command: &str,
        platform: &str,
    ) -> Result<Vec<ParsedRow>, TemplateError> {
        let name = self
            .index
            .template_for(platform, command)
            .ok_or_else(|| TemplateError::NoTemplate {
                command: command.to_string(),
                platform: platform.to_string(),
            })?;
        let template = Template::parse(&self.template_text(name)?)?;
        template.parse_text(raw)
    }

    /// Parse `raw`, falling back to the raw text on any failure.
    pub fn parse(&self, raw: &str, command: &str, platform: &str) -> Parsed {
        match self.try_parse(raw, command, platform) {
            Ok(rows) if !rows.is_empty() => Parsed::Rows(rows),
            Ok(_) => {
                debug!("no records for '{}' on {}, returning raw text", command, platform);
                Parsed::Raw(raw.to_string())
            }
            Err(e) => {
                debug!("raw fallback for '{}' on {}: {}", command, platform, e);
                Parsed::Raw(raw.to_string())
            }
        }
    }

    /// Parse `command`'s output for many devices, keeping input order.
    ///
    /// A device without output for `command` yields an empty raw response.
    pub fn parse_batch(
        &self,
        outputs: &IndexMap<String, IndexMap<String, String>>,
        command: &str,
        platform: &str,
    ) -> Vec<DeviceResponse> {
        outputs
            .iter()
            .map(|(device, commands)| DeviceResponse {
                device: device.clone(),
                response: match commands.get(command) {
                    Some(raw) => self.parse(raw, command, platform),
                    None => Parsed::Raw(String::new()),
                },
            })
            .collect()
    }
}

/// Parse `raw` with the templates indexed by `index_path`.
///
/// An unreadable index falls back to the raw text like any other failure.
pub fn parse_output(raw: &str, command: &str, platform: &str, index_path: &Path) -> Parsed {
    match OutputParser::load(index_path) {
        Ok(parser) => parser.parse(raw, command, platform),
        Err(e) => {
            warn!("cannot load template index {}: {}", index_path.display(), e);
            Parsed::Raw(raw.to_string())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::platform::Platform;

    const INTF_BRIEF: &str = "\
Interface              IP-Address      OK? Method Status                Protocol
GigabitEthernet1       10.0.0.1        YES NVRAM  up                    up
Loopback0              1.1.1.1         YES manual up                    up
";

    #[test]
    fn test_builtin_index_covers_every_template() {
        let parser = OutputParser::builtin();
        assert!(!parser.index().is_empty());
        for (name, text) in BUILTIN_TEMPLATES {
            Template::parse(text).unwrap_or_else(|e| panic!("{name}: {e}"));
        }
        for platform in Platform::ALL {
            assert!(
                parser
                    .index()
                    .lookup(platform.template_name(), "show version")
                    .is_some()
                    || platform == Platform::CiscoAireosSsh
                    || platform == Platform::F5TmosIcontrol,
                "{platform}"
            );
        }
    }

    #[test]
    fn test_parse_builtin_rows() {
        let parsed = OutputParser::builtin().parse(INTF_BRIEF, "show ip int brief", "cisco_ios");
        let rows = parsed.rows().unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[1]["intf"].as_str(), Some("Loopback0"));
    }

    #[test]
    fn test_unknown_command_falls_back_to_raw() {
        let parser = OutputParser::builtin();
        for platform in Platform::ALL {
            let parsed = parser.parse("some output", "show clock", platform.template_name());
            assert_eq!(parsed, Parsed::Raw("some output".into()));
        }
    }

    #[test]
    fn test_rows_match_reference_textfsm() {
        let text = BUILTIN_TEMPLATES
            .iter()
            .find(|(name, _)| *name == "cisco_ios_show_ip_interface_brief.textfsm")
            .map(|(_, text)| *text)
            .unwrap();

        let reference = textfsm_rust::Template::parse_str(text)
            .unwrap()
            .parser()
            .parse_text_to_dicts(INTF_BRIEF)
            .unwrap();
        let ours = Template::parse(text).unwrap().parse_text(INTF_BRIEF).unwrap();

        assert_eq!(ours.len(), reference.len());
        for (row, expected) in ours.iter().zip(&reference) {
            for (key, value) in expected {
                assert_eq!(
                    row[key.to_lowercase().as_str()].as_str(),
                    Some(value.as_str()),
                    "{key}"
                );
            }
        }
    }

    #[test]
    fn test_zero_records_falls_back_to_raw() {
        let parsed = OutputParser::builtin().parse("nothing here", "show ip int brief", "cisco_ios");
        assert!(parsed.is_raw());
    }

    #[test]
    fn test_raw_serializes_as_single_element_list() {
        let raw = Parsed::Raw("text".into());
        assert_eq!(serde_json::to_value(&raw).unwrap(), serde_json::json!(["text"]));
    }

    #[test]
    fn test_broken_template_falls_back() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join(INDEX_FILE),
            "Template, Platform, Command\nbroken.textfsm, cisco_ios, show clock\n",
        )
        .unwrap();
        std::fs::write(dir.path().join("broken.textfsm"), "Value X (\\d+\n\nStart\n").unwrap();

        let parser = OutputParser::from_dir(dir.path(), INDEX_FILE).unwrap();
        assert!(parser.try_parse("10:00", "show clock", "cisco_ios").is_err());
        assert_eq!(
            parser.parse("10:00", "show clock", "cisco_ios"),
            Parsed::Raw("10:00".into())
        );
    }

    #[test]
    fn test_directory_templates_and_parse_output() {
        let dir = tempfile::tempdir().unwrap();
        let index = dir.path().join(INDEX_FILE);
        std::fs::write(
            &index,
            "Template, Hostname, Platform, Command\nclock.textfsm, .*, cisco_ios, sh[[ow]] clo[[ck]]\n",
        )
        .unwrap();
        std::fs::write(
            dir.path().join("clock.textfsm"),
            "Value TIME (\\S+)\nValue ZONE (\\S+)\n\nStart\n  ^\\*?${TIME}\\s+${ZONE} -> Record\n",
        )
        .unwrap();

        let parsed = parse_output("*10:00:00.000 UTC Mon Mar 1 2021", "sh clock", "cisco_ios", &index);
        let rows = parsed.rows().unwrap();
        assert_eq!(rows[0]["time"].as_str(), Some("10:00:00.000"));
        assert_eq!(rows[0]["zone"].as_str(), Some("UTC"));

        let missing = parse_output("x", "show clock", "cisco_ios", &dir.path().join("nope"));
        assert_eq!(missing, Parsed::Raw("x".into()));
    }

    #[test]
    fn test_batch_preserves_device_order() {
        let mut outputs = IndexMap::new();
        for device in ["rtr3", "rtr1", "rtr2"] {
            let mut commands = IndexMap::new();
            commands.insert("show ip int brief".to_string(), INTF_BRIEF.to_string());
            outputs.insert(device.to_string(), commands);
        }
        outputs.insert("rtr4".to_string(), IndexMap::new());

        let responses = OutputParser::builtin().parse_batch(&outputs, "show ip int brief", "cisco_ios");
        let devices: Vec<_> = responses.iter().map(|r| r.device.as_str()).collect();
        assert_eq!(devices, vec!["rtr3", "rtr1", "rtr2", "rtr4"]);
        assert!(!responses[0].response.is_raw());
        assert_eq!(responses[3].response, Parsed::Raw(String::new()));
    }
}
