//! router-core
//!
//! Pure channel-runtime logic:
//! - identifiers and channel/broadcast enums
//! - structured records and the merge algorithm
//! - field-mask filtering
//! - channel data with its coalescing update buffer
//! - subscriptions and the per-channel fan-out pass
//! - control message types (transport-agnostic)

pub mod id;
pub mod channel_type;
pub mod state;
pub mod time;
pub mod broadcast;
pub mod record;
pub mod merge;
pub mod field_mask;
pub mod channel_data;
pub mod subscription;
pub mod channel;
pub mod messages;
pub mod error;

pub use id::{ChannelId, ConnectionId};
pub use channel_type::ChannelType;
pub use state::ChannelState;
pub use time::ChannelTime;
pub use broadcast::BroadcastType;

pub use record::{FieldValue, MapKey, Record};
pub use merge::{merge_with_options, MergeOptions};
pub use field_mask::FieldMaskTree;
pub use channel_data::{BufferedUpdate, ChannelData};
pub use subscription::{ChannelSubscription, ChannelSubscriptionOptions, SubscriptionOptionsPatch};
pub use channel::{Channel, FanOutDelivery};

pub use messages::{
    ChannelDataUpdateMessage,
    ChannelListing,
    ControlMessage,
    CreateChannelMessage,
    CreateChannelResultMessage,
    ListChannelMessage,
    ListChannelResultMessage,
    MessageContext,
    RemoveChannelMessage,
    RemoveChannelResultMessage,
    ServerErrorMessage,
    SubToChannelMessage,
    SubToChannelResultMessage,
    UnsubFromChannelMessage,
    UnsubFromChannelResultMessage,
    UserSpaceMessage,
};

pub use error::{ErrorCode, ServerError};
