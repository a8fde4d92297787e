//! Extraction of `[tag @ address] text` diagnostics from tool output.

use once_cell::sync::Lazy;
use regex_lite::Regex;
use serde::ser::{Serialize, SerializeMap, Serializer};

static MESSAGE_LINE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\[([a-zA-Z0-9]+) @ (0x[a-z0-9]+)\] (.*)").expect("message pattern is valid")
});

/// Messages emitted by one component instance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessageInstance {
    pub address: String,
    pub lines: Vec<String>,
}

/// Messages grouped by the emitting component tag.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessageSource {
    pub tag: String,
    pub instances: Vec<MessageInstance>,
}

/// Diagnostics keyed by tag, then address, in first-encountered order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Messages {
    sources: Vec<MessageSource>,
}

impl Messages {
    /// Whether no diagnostics were found.
    pub fn is_empty(&self) -> bool {
        self.sources.is_empty()
    }

    /// Number of distinct tags.
    pub fn len(&self) -> usize {
        self.sources.len()
    }

    /// Tags in first-encountered order.
    pub fn tags(&self) -> impl Iterator<Item = &str> {
        self.sources.iter().map(|s| s.tag.as_str())
    }

    /// Addresses seen for `tag`, in first-encountered order.
    pub fn addresses(&self, tag: &str) -> Vec<&str> {
        self.source(tag)
            .map(|s| s.instances.iter().map(|i| i.address.as_str()).collect())
            .unwrap_or_default()
    }

    /// Messages for one tag/address pair.
    pub fn get(&self, tag: &str, address: &str) -> Option<&[String]> {
        self.source(tag)?
            .instances
            .iter()
            .find(|i| i.address == address)
            .map(|i| i.lines.as_slice())
    }

    /// Every `(tag, address, lines)` triple.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str, &[String])> {
        self.sources.iter().flat_map(|source| {
            source
                .instances
                .iter()
                .map(move |i| (source.tag.as_str(), i.address.as_str(), i.lines.as_slice()))
        })
    }

    fn source(&self, tag: &str) -> Option<&MessageSource> {
        self.sources.iter().find(|s| s.tag == tag)
    }

    fn push(&mut self, tag: &str, address: &str, line: String) {
        let source = match self.sources.iter().position(|s| s.tag == tag) {
            Some(idx) => &mut self.sources[idx],
            None => {
                self.sources.push(MessageSource {
                    tag: tag.to_string(),
                    instances: Vec::new(),
                });
                let last = self.sources.len() - 1;
                &mut self.sources[last]
            }
        };

        match source.instances.iter_mut().find(|i| i.address == address) {
            Some(instance) => instance.lines.push(line),
            None => source.instances.push(MessageInstance {
                address: address.to_string(),
                lines: vec![line],
            }),
        }
    }
}

impl Serialize for Messages {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        struct Instances<'a>(&'a [MessageInstance]);

        impl Serialize for Instances<'_> {
            fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
                let mut map = serializer.serialize_map(Some(self.0.len()))?;
                for instance in self.0 {
                    map.serialize_entry(&instance.address, &instance.lines)?;
                }
                map.end()
            }
        }

        let mut map = serializer.serialize_map(Some(self.sources.len()))?;
        for source in &self.sources {
            map.serialize_entry(&source.tag, &Instances(&source.instances))?;
        }
        map.end()
    }
}

/// Scans tool output for component diagnostics.
///
/// Repeated tag/address pairs accumulate. Text without any match yields an
/// empty result.
pub fn parse_messages(text: &str) -> Messages {
    let mut messages = Messages::default();
    for caps in MESSAGE_LINE.captures_iter(text) {
        let (Some(tag), Some(address), Some(line)) = (caps.get(1), caps.get(2), caps.get(3))
        else {
            continue;
        };
        let line = line.as_str().trim_end_matches('\r').to_string();
        messages.push(tag.as_str(), address.as_str(), line);
    }
    messages
}
