//! Session descriptor types and their extraction from platform records.
//!
//! The platform feed yields [`RawRecord`]s: the publicly-exposed fields
//! plus an opaque handle. Port id and owner id only exist behind that
//! handle, so a full [`SessionDescriptor`] is assembled through the
//! introspection shim and is valid for one event delivery only.

use crate::probe::{DescriptorHandle, FieldValue, Prober};
use serde::{Deserialize, Serialize};

/// Platform member names probed off a recording descriptor.
pub const MEMBER_CLIENT_PORT_ID: &str = "getClientPortId";
pub const MEMBER_CLIENT_PACKAGE_NAME: &str = "getClientPackageName";
pub const MEMBER_LOG_FRIENDLY_STRING: &str = "toLogFriendlyString";

/// Descriptor type the members above live on.
pub const RECORDING_CONFIGURATION_TYPE: &str = "android.media.AudioRecordingConfiguration";

/// Audio source kind of a recording client.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AudioSource {
    Default,
    Mic,
    VoiceUplink,
    VoiceDownlink,
    VoiceCall,
    Camcorder,
    VoiceRecognition,
    VoiceCommunication,
    Unprocessed,
    Unknown(i32),
}

impl AudioSource {
    pub fn from_raw(raw: i32) -> Self {
        match raw {
            0 => AudioSource::Default,
            1 => AudioSource::Mic,
            2 => AudioSource::VoiceUplink,
            3 => AudioSource::VoiceDownlink,
            4 => AudioSource::VoiceCall,
            5 => AudioSource::Camcorder,
            6 => AudioSource::VoiceRecognition,
            7 => AudioSource::VoiceCommunication,
            9 => AudioSource::Unprocessed,
            other => AudioSource::Unknown(other),
        }
    }

    pub fn name(&self) -> String {
        match self {
            AudioSource::Default => "DEFAULT".to_string(),
            AudioSource::Mic => "MIC".to_string(),
            AudioSource::VoiceUplink => "VOICE_UPLINK".to_string(),
            AudioSource::VoiceDownlink => "VOICE_DOWNLINK".to_string(),
            AudioSource::VoiceCall => "VOICE_CALL".to_string(),
            AudioSource::Camcorder => "CAMCORDER".to_string(),
            AudioSource::VoiceRecognition => "VOICE_RECOGNITION".to_string(),
            AudioSource::VoiceCommunication => "VOICE_COMMUNICATION".to_string(),
            AudioSource::Unprocessed => "UNPROCESSED".to_string(),
            AudioSource::Unknown(raw) => format!("UNKNOWN ({raw})"),
        }
    }
}

/// Global audio mode of the platform.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AudioMode {
    Normal,
    Ringtone,
    InCall,
    InCommunication,
    Unknown(i32),
}

impl AudioMode {
    pub fn from_raw(raw: i32) -> Self {
        match raw {
            0 => AudioMode::Normal,
            1 => AudioMode::Ringtone,
            2 => AudioMode::InCall,
            3 => AudioMode::InCommunication,
            other => AudioMode::Unknown(other),
        }
    }

    fn raw(&self) -> i32 {
        match self {
            AudioMode::Normal => 0,
            AudioMode::Ringtone => 1,
            AudioMode::InCall => 2,
            AudioMode::InCommunication => 3,
            AudioMode::Unknown(raw) => *raw,
        }
    }

    pub fn describe(&self) -> String {
        let raw = self.raw();
        match self {
            AudioMode::Normal => format!("Audio Mode: Normal ({raw})"),
            AudioMode::Ringtone => format!("Audio Mode: Ringtone ({raw})"),
            AudioMode::InCall => format!("Audio Mode: In Call ({raw})"),
            AudioMode::InCommunication => format!("Audio Mode: Communication ({raw})"),
            AudioMode::Unknown(_) => format!("Audio Mode: Unknown ({raw})"),
        }
    }
}

/// One active recording client as the platform feed delivers it.
#[derive(Debug, Clone)]
pub struct RawRecord {
    pub session_id: i32,
    pub source: AudioSource,
    pub sample_rate_hz: u32,
    pub silenced: bool,
    pub handle: DescriptorHandle,
}

/// Fully-extracted descriptor view. Exists for one event delivery.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionDescriptor {
    pub session_id: i32,
    pub port_id: FieldValue,
    pub owner_id: FieldValue,
    pub source: AudioSource,
    pub sample_rate_hz: u32,
    pub silenced: bool,
}

impl SessionDescriptor {
    /// Pulls the hidden fields through the shim; sentinels degrade
    /// gracefully on platforms that do not expose them.
    pub fn extract(record: &RawRecord, prober: &Prober) -> Self {
        Self {
            session_id: record.session_id,
            port_id: prober.int_member(&record.handle, MEMBER_CLIENT_PORT_ID),
            owner_id: prober.string_member(&record.handle, MEMBER_CLIENT_PACKAGE_NAME),
            source: record.source,
            sample_rate_hz: record.sample_rate_hz,
            silenced: record.silenced,
        }
    }
}
