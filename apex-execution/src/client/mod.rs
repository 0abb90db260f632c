/// Wire <-> domain conversions shared by the gateway client and server.
pub mod convert;

/// Gateway client session and the realtime [`GatewayRouter`](gateway::GatewayRouter).
pub mod gateway;
