//! Attribute keys the boundary wrappers agree on.
//!
//! Keeping the vocabulary in one place means a span produced by the HTTP
//! client and one produced by a message consumer describe the same fact
//! with the same key, and backends can aggregate across both.

/// Message describing an error captured on a span.
///
/// Example: `"connection refused"`
pub const EXCEPTION_MESSAGE: &str = "exception.message";

/// HTTP request method.
///
/// Example: `"GET"`
pub const HTTP_METHOD: &str = "http.method";

/// URI scheme of the request.
///
/// Example: `"https"`
pub const HTTP_SCHEME: &str = "http.scheme";

/// Full request URL.
///
/// Example: `"https://example.com/orders?id=7"`
pub const HTTP_URL: &str = "http.url";

/// Numeric HTTP response status code.
///
/// Example: `200`
pub const HTTP_STATUS_CODE: &str = "http.status_code";

/// Hostname of the remote peer being called.
///
/// Example: `"orders.svc.local"`
pub const NET_PEER_NAME: &str = "net.peer.name";

/// Port of the remote peer being called.
///
/// Example: `8080`
pub const NET_PEER_PORT: &str = "net.peer.port";

/// Messaging system the record moved through.
///
/// Example: `"kafka"`
pub const MESSAGING_SYSTEM: &str = "messaging.system";

/// Topic or queue name.
///
/// Example: `"orders"`
pub const MESSAGING_DESTINATION: &str = "messaging.destination";

/// What the span did with the record, `"send"` or `"process"`.
pub const MESSAGING_OPERATION: &str = "messaging.operation";

/// Partition of the destination the record landed on or came from.
///
/// Example: `3`
pub const MESSAGING_DESTINATION_PARTITION: &str = "messaging.destination.partition";

/// Position of the record within its partition.
///
/// Example: `42`
pub const MESSAGING_OFFSET: &str = "messaging.offset";
