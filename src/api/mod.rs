mod client;
mod handler;
mod rpc;

pub use client::{into_stream, ClientError, Connector, CoreLink, RpcCoreLink, REQUEST_TIMEOUT};
pub use handler::{serve, CoreRpc, ServeError};
pub use rpc::{
    AliasSummary, CoreApiClient, CoreApiServer, LinkStateApiClient, LinkStateEvent,
    NexthopSummary, Operation, RibsApiClient, RibsApiServer, SpeakerApiClient, TenantSummary,
    VpnRequest,
};
