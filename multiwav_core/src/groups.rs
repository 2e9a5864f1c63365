//! Partitioning of the channel axis into output groups.
//!
//! A channel whose link flag is set joins the group of the channel before it;
//! any other channel opens a new group. Whether a group is exported is decided
//! by its first channel alone.

use log::warn;

/// Per-channel choices made by the user. Channels without an explicit entry
/// are exported, unlinked and unnamed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChannelSettings {
    export: Vec<bool>,
    link: Vec<bool>,
    names: Vec<String>,
}

impl ChannelSettings {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build settings from parallel per-channel arrays.
    pub fn from_flags(export: Vec<bool>, link: Vec<bool>, names: Vec<String>) -> Self {
        Self {
            export,
            link,
            names,
        }
    }

    pub fn set_export(&mut self, channel: usize, export: bool) -> &mut Self {
        set_at(&mut self.export, channel, export, true);
        self
    }

    pub fn set_link(&mut self, channel: usize, link: bool) -> &mut Self {
        set_at(&mut self.link, channel, link, false);
        self
    }

    pub fn set_name(&mut self, channel: usize, name: impl Into<String>) -> &mut Self {
        set_at(&mut self.names, channel, name.into(), String::new());
        self
    }

    pub fn export(&self, channel: usize) -> bool {
        self.export.get(channel).copied().unwrap_or(true)
    }

    pub fn link(&self, channel: usize) -> bool {
        self.link.get(channel).copied().unwrap_or(false)
    }

    pub fn name(&self, channel: usize) -> &str {
        self.names.get(channel).map(String::as_str).unwrap_or("")
    }

    /// Number of channels that carry an explicit setting.
    fn configured_channels(&self) -> usize {
        self.export.len().max(self.link.len()).max(self.names.len())
    }
}

fn set_at<T: Clone>(values: &mut Vec<T>, index: usize, value: T, fill: T) {
    if values.len() <= index {
        values.resize(index + 1, fill);
    }
    values[index] = value;
}

/// A contiguous run of channels written to one set of output files.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelGroup {
    pub first_channel: usize,
    pub last_channel: usize,
    pub export: bool,
    pub label: String,
}

impl ChannelGroup {
    pub fn channel_count(&self) -> usize {
        self.last_channel - self.first_channel + 1
    }

    /// Output file stem: `ch<first>[-<last>][_<label>]`, 1-based.
    pub fn base_name(&self) -> String {
        let mut name = format!("ch{}", self.first_channel + 1);
        if self.last_channel != self.first_channel {
            name.push_str(&format!("-{}", self.last_channel + 1));
        }
        if !self.label.is_empty() {
            name.push('_');
            name.push_str(&self.label);
        }
        name
    }
}

/// Split `[0, channel_count)` into groups, exported or not.
pub fn partition_channels(channel_count: usize, settings: &ChannelSettings) -> Vec<ChannelGroup> {
    if settings.configured_channels() > channel_count {
        warn!(
            "settings name {} channels but the recording has only {}; extra entries are ignored",
            settings.configured_channels(),
            channel_count
        );
    }

    let mut groups = Vec::new();
    if channel_count == 0 {
        return groups;
    }

    let open = |first: usize| ChannelGroup {
        first_channel: first,
        last_channel: first,
        export: settings.export(first),
        label: settings.name(first).to_owned(),
    };

    let mut current = open(0);
    for channel in 1..channel_count {
        if settings.link(channel) {
            current.last_channel = channel;
        } else {
            groups.push(std::mem::replace(&mut current, open(channel)));
        }
    }
    groups.push(current);
    groups
}

/// The groups that will be written, in channel order.
pub fn plan_groups(channel_count: usize, settings: &ChannelSettings) -> Vec<ChannelGroup> {
    partition_channels(channel_count, settings)
        .into_iter()
        .filter(|group| group.export)
        .collect()
}
