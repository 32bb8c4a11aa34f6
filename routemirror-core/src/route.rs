//! Route - Live routes, their identity, and their persisted mirror form
//!
//! A live route as reported by the transit gateway can carry several
//! attachments. Each (route, attachment) pairing is one [`CanonicalRoute`],
//! identified by a [`RouteKey`]. The key renders into an [`ItemKey`], which is
//! both the diff key and the primary key of the mirror store.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Attribute names used for mirror rows
pub mod attr {
    pub const HASH_KEY: &str = "HashKey";
    pub const SORT_KEY: &str = "SortKey";
    pub const DESTINATION_CIDR_BLOCK: &str = "DestinationCidrBlock";
    pub const RESOURCE_ID: &str = "ResourceId";
    pub const ATTACHMENT_ID: &str = "TransitGatewayAttachmentId";
    pub const RESOURCE_TYPE: &str = "ResourceType";
    pub const ROUTE_TYPE: &str = "RouteType";
    pub const STATE: &str = "State";
}

/// Separator between sort key fields
pub const KEY_DELIMITER: char = '#';

const KEY_ESCAPE: char = '\\';

/// Number of fields encoded in a sort key
const SORT_KEY_FIELDS: usize = 4;

/// Binding between a route table and a resource that propagates routes
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attachment {
    /// Resource behind the attachment (e.g., vpc-0abc)
    pub resource_id: String,
    /// Transit gateway attachment id (e.g., tgw-attach-0abc)
    pub attachment_id: String,
    /// Resource type (e.g., "vpc", "vpn")
    pub resource_type: String,
}

impl Attachment {
    pub fn new(
        resource_id: impl Into<String>,
        attachment_id: impl Into<String>,
        resource_type: impl Into<String>,
    ) -> Self {
        Self {
            resource_id: resource_id.into(),
            attachment_id: attachment_id.into(),
            resource_type: resource_type.into(),
        }
    }
}

/// A route as returned by the live source, before fan-out
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawLiveRoute {
    pub destination_cidr: String,
    /// "static" or "propagated"
    pub route_type: String,
    /// "active", "blackhole", ...
    pub state: String,
    pub attachments: Vec<Attachment>,
}

impl RawLiveRoute {
    pub fn new(
        destination_cidr: impl Into<String>,
        route_type: impl Into<String>,
        state: impl Into<String>,
    ) -> Self {
        Self {
            destination_cidr: destination_cidr.into(),
            route_type: route_type.into(),
            state: state.into(),
            attachments: Vec::new(),
        }
    }

    pub fn with_attachment(mut self, attachment: Attachment) -> Self {
        self.attachments.push(attachment);
        self
    }
}

/// Filter applied when searching the live source
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouteFilter {
    pub resource_type: String,
    pub route_type: String,
}

impl RouteFilter {
    pub fn new(resource_type: impl Into<String>, route_type: impl Into<String>) -> Self {
        Self {
            resource_type: resource_type.into(),
            route_type: route_type.into(),
        }
    }

    /// Routes propagated from VPC attachments (the reconciled set)
    pub fn vpc_propagated() -> Self {
        Self::new("vpc", "propagated")
    }

    /// Routes propagated from VPN attachments (the counted set)
    pub fn vpn_propagated() -> Self {
        Self::new("vpn", "propagated")
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum KeyError {
    #[error("Sort key has {found} fields, expected {expected}: {key}")]
    FieldCount {
        key: String,
        expected: usize,
        found: usize,
    },

    #[error("Sort key ends with a dangling escape: {0}")]
    DanglingEscape(String),
}

/// Typed identity of one route+attachment pairing
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RouteKey {
    pub route_table_id: String,
    pub destination_cidr: String,
    pub resource_id: String,
    pub attachment_id: String,
    pub resource_type: String,
}

impl RouteKey {
    /// Render the sort key: `cidr#resource#attachment#type`, with `#` and `\`
    /// inside fields escaped by `\`
    pub fn sort_key(&self) -> String {
        let fields = [
            &self.destination_cidr,
            &self.resource_id,
            &self.attachment_id,
            &self.resource_type,
        ];

        let mut rendered = String::new();
        for (i, field) in fields.iter().enumerate() {
            if i > 0 {
                rendered.push(KEY_DELIMITER);
            }
            for c in field.chars() {
                if c == KEY_DELIMITER || c == KEY_ESCAPE {
                    rendered.push(KEY_ESCAPE);
                }
                rendered.push(c);
            }
        }
        rendered
    }

    /// Storage identity of this route
    pub fn item_key(&self) -> ItemKey {
        ItemKey::new(self.route_table_id.clone(), self.sort_key())
    }

    /// Parse a rendered sort key back into its fields
    pub fn parse(route_table_id: impl Into<String>, sort_key: &str) -> Result<Self, KeyError> {
        let mut fields = Vec::with_capacity(SORT_KEY_FIELDS);
        let mut current = String::new();
        let mut chars = sort_key.chars();

        while let Some(c) = chars.next() {
            match c {
                KEY_ESCAPE => match chars.next() {
                    Some(escaped) => current.push(escaped),
                    None => return Err(KeyError::DanglingEscape(sort_key.to_string())),
                },
                KEY_DELIMITER => fields.push(std::mem::take(&mut current)),
                other => current.push(other),
            }
        }
        fields.push(current);

        if fields.len() != SORT_KEY_FIELDS {
            return Err(KeyError::FieldCount {
                key: sort_key.to_string(),
                expected: SORT_KEY_FIELDS,
                found: fields.len(),
            });
        }

        let mut fields = fields.into_iter();
        let mut next = || fields.next().unwrap_or_default();
        Ok(Self {
            route_table_id: route_table_id.into(),
            destination_cidr: next(),
            resource_id: next(),
            attachment_id: next(),
            resource_type: next(),
        })
    }
}

impl std::fmt::Display for RouteKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.route_table_id, self.sort_key())
    }
}

/// Primary key of a mirror row
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ItemKey {
    /// Partition: the owning route table id
    #[serde(rename = "HashKey")]
    pub hash_key: String,
    /// Rendered [`RouteKey::sort_key`]
    #[serde(rename = "SortKey")]
    pub sort_key: String,
}

impl ItemKey {
    pub fn new(hash_key: impl Into<String>, sort_key: impl Into<String>) -> Self {
        Self {
            hash_key: hash_key.into(),
            sort_key: sort_key.into(),
        }
    }
}

impl std::fmt::Display for ItemKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.hash_key, self.sort_key)
    }
}

/// One route+attachment pairing built from the live source
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CanonicalRoute {
    pub route_table_id: String,
    pub destination_cidr: String,
    pub resource_id: String,
    pub attachment_id: String,
    pub resource_type: String,
    pub route_type: String,
    pub state: String,
}

impl CanonicalRoute {
    /// Build the canonical route for one attachment of a raw route
    pub fn from_attachment(
        route_table_id: impl Into<String>,
        route: &RawLiveRoute,
        attachment: &Attachment,
    ) -> Self {
        Self {
            route_table_id: route_table_id.into(),
            destination_cidr: route.destination_cidr.clone(),
            resource_id: attachment.resource_id.clone(),
            attachment_id: attachment.attachment_id.clone(),
            resource_type: attachment.resource_type.clone(),
            route_type: route.route_type.clone(),
            state: route.state.clone(),
        }
    }

    pub fn key(&self) -> RouteKey {
        RouteKey {
            route_table_id: self.route_table_id.clone(),
            destination_cidr: self.destination_cidr.clone(),
            resource_id: self.resource_id.clone(),
            attachment_id: self.attachment_id.clone(),
            resource_type: self.resource_type.clone(),
        }
    }

    pub fn item_key(&self) -> ItemKey {
        self.key().item_key()
    }

    /// Mirror row written for this route
    pub fn to_persisted(&self) -> PersistedRoute {
        PersistedRoute {
            key: self.item_key(),
            destination_cidr: Some(self.destination_cidr.clone()),
            resource_id: Some(self.resource_id.clone()),
            attachment_id: Some(self.attachment_id.clone()),
            resource_type: Some(self.resource_type.clone()),
            route_type: Some(self.route_type.clone()),
            state: Some(self.state.clone()),
        }
    }
}

/// A mirror row. Only the key is guaranteed; rows written by older versions
/// may lack some attributes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PersistedRoute {
    #[serde(flatten)]
    pub key: ItemKey,
    #[serde(
        rename = "DestinationCidrBlock",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub destination_cidr: Option<String>,
    #[serde(rename = "ResourceId", default, skip_serializing_if = "Option::is_none")]
    pub resource_id: Option<String>,
    #[serde(
        rename = "TransitGatewayAttachmentId",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub attachment_id: Option<String>,
    #[serde(rename = "ResourceType", default, skip_serializing_if = "Option::is_none")]
    pub resource_type: Option<String>,
    #[serde(rename = "RouteType", default, skip_serializing_if = "Option::is_none")]
    pub route_type: Option<String>,
    #[serde(rename = "State", default, skip_serializing_if = "Option::is_none")]
    pub state: Option<String>,
}

impl PersistedRoute {
    /// A row carrying only its key
    pub fn from_key(key: ItemKey) -> Self {
        Self {
            key,
            destination_cidr: None,
            resource_id: None,
            attachment_id: None,
            resource_type: None,
            route_type: None,
            state: None,
        }
    }

    pub fn route_table_id(&self) -> &str {
        &self.key.hash_key
    }
}
