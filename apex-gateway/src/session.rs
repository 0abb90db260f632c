use apex_data::tick::{TickTop, TickTrade};
use apex_execution::{
    client::convert,
    order::{OrderFill, OrderParams, OrderType, OrderUpdate},
};
use apex_instrument::exchange::ExchangeId;
use apex_integration::{
    error::SocketError,
    event_loop::{EventLoop, EventLoopExt},
    protocol::gx::{
        encode_frame,
        message::{
            CancelOrder, ErrorReply, NewOrder, OmLogonReply, OmLogonRequest, OrderExecution,
            OrderFillReport, OrderUpdateReason, SubscribeTicks, TopTick, TradeTick,
        },
        FrameCodec, FrameHeader, MsgType,
    },
    reactor::TcpConnection,
    RunMode,
};
use bytes::Bytes;
use parking_lot::Mutex;
use prost::Message;
use smol_str::SmolStr;
use std::{
    str::FromStr,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
};
use tracing::{debug, info, warn};

/// Identity of an inbound request, echoed back on replies for correlation.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub struct SessionRequest {
    pub req_type: MsgType,
    pub req_id: u32,
}

#[derive(Debug, Clone, Eq, PartialEq)]
pub struct SubscribeRequest {
    pub symbol: SmolStr,
    pub exchange: ExchangeId,
}

#[derive(Debug, Clone, Eq, PartialEq)]
pub struct LogonRequest {
    pub strategy_id: String,
    pub run_mode: Option<RunMode>,
}

#[derive(Debug, Clone, Eq, PartialEq)]
pub struct CancelRequest {
    pub symbol: SmolStr,
    pub exchange: ExchangeId,
    pub order_id: String,
    pub ext_order_id: String,
}

/// Request callbacks wired in by the [`GatewayServer`](crate::server::GatewayServer). All
/// run on the event-loop thread.
pub struct SessionHandlers {
    pub on_subscribe: Box<dyn FnMut(&Arc<GatewayServerSession>, SubscribeRequest) + Send>,
    pub on_submit_order:
        Box<dyn FnMut(&Arc<GatewayServerSession>, SessionRequest, OrderParams) + Send>,
    pub on_cancel_order:
        Box<dyn FnMut(&Arc<GatewayServerSession>, SessionRequest, CancelRequest) + Send>,
    /// Returns whether the logon is accepted.
    pub on_logon: Box<dyn FnMut(&Arc<GatewayServerSession>, LogonRequest) -> bool + Send>,
    pub on_closed: Box<dyn FnMut(&Arc<GatewayServerSession>) + Send>,
}

impl std::fmt::Debug for SessionHandlers {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("SessionHandlers")
    }
}

/// Server side of one accepted client connection.
///
/// Frames are reassembled and decoded on the reactor thread; typed requests are marshalled
/// onto the event loop and handed to the [`SessionHandlers`]. Reply helpers write frames
/// back to the client socket.
pub struct GatewayServerSession {
    conn: TcpConnection,
    evloop: Arc<dyn EventLoop>,
    handlers: Mutex<SessionHandlers>,
    logon_accepted: AtomicBool,
}

impl std::fmt::Debug for GatewayServerSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GatewayServerSession")
            .field("peer", &self.conn.peer_addr())
            .field("connected", &self.conn.is_connected())
            .finish()
    }
}

impl GatewayServerSession {
    pub fn new(
        conn: TcpConnection,
        evloop: Arc<dyn EventLoop>,
        handlers: SessionHandlers,
    ) -> Arc<Self> {
        Arc::new(Self {
            conn,
            evloop,
            handlers: Mutex::new(handlers),
            logon_accepted: AtomicBool::new(false),
        })
    }

    /// Begin reading frames from the client.
    pub fn start(self: &Arc<Self>) -> Result<(), SocketError> {
        let session = Arc::downgrade(self);
        let conn_on_err = self.conn.clone();
        let mut codec = FrameCodec::default();

        self.conn.start_read(move |result| {
            let Some(session) = session.upgrade() else {
                return;
            };
            match result {
                Ok(bytes) if bytes.is_empty() => {
                    info!(peer = ?conn_on_err.peer_addr(), "gateway client disconnected");
                    conn_on_err.close();
                    session.notify_closed();
                }
                Err(error) => {
                    warn!(%error, "gateway client read error");
                    conn_on_err.close();
                    session.notify_closed();
                }
                Ok(bytes) => {
                    if let Err(error) = codec.consume(&bytes) {
                        warn!(%error, "gateway client fatal decode error");
                        conn_on_err.close();
                        session.notify_closed();
                        return;
                    }
                    loop {
                        match codec.next_frame() {
                            Ok(Some((header, payload))) => session.io_on_frame(header, payload),
                            Ok(None) => break,
                            Err(error) => {
                                warn!(%error, "gateway client fatal decode error");
                                conn_on_err.close();
                                session.notify_closed();
                                break;
                            }
                        }
                    }
                }
            }
        })
    }

    pub fn is_connected(&self) -> bool {
        self.conn.is_connected()
    }

    pub fn is_logged_on(&self) -> bool {
        self.logon_accepted.load(Ordering::Acquire)
    }

    pub fn close(&self) {
        self.conn.close();
    }

    fn notify_closed(self: &Arc<Self>) {
        let session = Arc::clone(self);
        self.evloop.dispatch(move || {
            let mut handlers = session.handlers.lock();
            let mut on_closed = std::mem::replace(&mut handlers.on_closed, Box::new(|_| {}));
            drop(handlers);
            on_closed(&session);
        });
    }

    /// Runs on the reactor thread: decode the payload and marshal to the event loop.
    /// Undecodable payloads drop the message with a warning.
    fn io_on_frame(self: &Arc<Self>, header: FrameHeader, payload: Bytes) {
        let Some(msg_type) = header.msg_type() else {
            warn!(msg_type = header.msg_type, "dropping client frame with unknown type");
            return;
        };

        match msg_type {
            MsgType::Subscribe => {
                let Ok(msg) = SubscribeTicks::decode(payload) else {
                    warn!("dropping undecodable subscribe request");
                    return;
                };
                let Ok(exchange) = ExchangeId::from_str(&msg.exchange) else {
                    warn!(exchange = %msg.exchange, "dropping subscribe for unknown exchange");
                    return;
                };
                self.dispatch_to_handler(move |session, handlers| {
                    (handlers.on_subscribe)(
                        session,
                        SubscribeRequest {
                            symbol: SmolStr::new(&msg.symbol),
                            exchange,
                        },
                    );
                });
            }
            MsgType::NewOrder => {
                let Ok(msg) = NewOrder::decode(payload) else {
                    warn!("dropping undecodable new-order request");
                    return;
                };
                let request = SessionRequest {
                    req_type: MsgType::NewOrder,
                    req_id: header.req_id,
                };
                self.dispatch_to_handler(move |session, handlers| {
                    let (Ok(exchange), Some(side), Some(tif)) = (
                        ExchangeId::from_str(&msg.exchange),
                        convert::side_from_wire(msg.side),
                        convert::tif_from_wire(msg.tif),
                    ) else {
                        session.send_error(
                            request,
                            apex_integration::error::code::PROTOCOL,
                            "malformed new-order request",
                        );
                        return;
                    };

                    let params = OrderParams {
                        symbol: SmolStr::new(&msg.symbol),
                        exchange,
                        side,
                        order_type: OrderType::Limit,
                        time_in_force: tif,
                        size: msg.size,
                        price: msg.price,
                        order_id: msg.order_id.clone(),
                    };
                    (handlers.on_submit_order)(session, request, params);
                });
            }
            MsgType::CancelOrder => {
                let Ok(msg) = CancelOrder::decode(payload) else {
                    warn!("dropping undecodable cancel-order request");
                    return;
                };
                let request = SessionRequest {
                    req_type: MsgType::CancelOrder,
                    req_id: header.req_id,
                };
                self.dispatch_to_handler(move |session, handlers| {
                    let Ok(exchange) = ExchangeId::from_str(&msg.exchange) else {
                        session.send_error(
                            request,
                            apex_integration::error::code::PROTOCOL,
                            "malformed cancel-order request",
                        );
                        return;
                    };
                    (handlers.on_cancel_order)(
                        session,
                        request,
                        CancelRequest {
                            symbol: SmolStr::new(&msg.symbol),
                            exchange,
                            order_id: msg.order_id.clone(),
                            ext_order_id: msg.ext_order_id.clone(),
                        },
                    );
                });
            }
            MsgType::OmLogon => {
                let Ok(msg) = OmLogonRequest::decode(payload) else {
                    warn!("dropping undecodable logon request");
                    return;
                };
                self.dispatch_to_handler(move |session, handlers| {
                    let request = LogonRequest {
                        strategy_id: msg.strategy_id.clone(),
                        run_mode: convert::run_mode_from_wire(msg.run_mode),
                    };
                    let accepted = (handlers.on_logon)(session, request);
                    session
                        .logon_accepted
                        .store(accepted, Ordering::Release);
                    session.send_logon_reply(if accepted { "" } else { "logon rejected" });
                });
            }
            MsgType::SubscribeAccount => {
                // reserved wire type
                debug!("ignoring subscribe-account request (reserved)");
            }
            other => {
                warn!(?other, "unhandled client message type");
            }
        }
    }

    fn dispatch_to_handler(
        self: &Arc<Self>,
        f: impl FnOnce(&Arc<GatewayServerSession>, &mut SessionHandlers) + Send + 'static,
    ) {
        let session = Arc::clone(self);
        self.evloop.dispatch(move || {
            // handlers are taken out for the call so they may themselves use the session's
            // reply helpers
            let mut handlers = session.handlers.lock();
            f(&session, &mut handlers);
        });
    }

    fn write_frame(&self, frame: &[u8]) -> Result<(), SocketError> {
        self.conn.write(frame)
    }

    pub fn send_trade(
        &self,
        symbol: &str,
        exchange: ExchangeId,
        tick: &TickTrade,
    ) -> Result<(), SocketError> {
        let msg = TradeTick {
            symbol: symbol.to_string(),
            exchange: exchange.as_str().to_string(),
            price: tick.price,
            size: tick.qty,
            side: tick
                .aggr_side
                .map(|side| convert::side_to_wire(side) as i32)
                .unwrap_or_default(),
        };
        self.write_frame(&encode_frame(MsgType::Trade, 0, &msg))
    }

    pub fn send_top(
        &self,
        symbol: &str,
        exchange: ExchangeId,
        tick: &TickTop,
    ) -> Result<(), SocketError> {
        let msg = TopTick {
            symbol: symbol.to_string(),
            exchange: exchange.as_str().to_string(),
            bid_price: tick.bid_price,
            ask_price: tick.ask_price,
        };
        self.write_frame(&encode_frame(MsgType::TickTop, 0, &msg))
    }

    /// Reply to `request` with an order execution, eg/ the venue's submit or cancel ack.
    pub fn send_order_execution(
        &self,
        request: SessionRequest,
        update: &OrderUpdate,
        reason: OrderUpdateReason,
    ) {
        let msg = OrderExecution {
            order_id: String::new(),
            ext_order_id: update.ext_order_id.clone(),
            order_state: update
                .state
                .map(|state| convert::order_state_to_wire(state) as i32)
                .unwrap_or_default(),
            close_reason: convert::close_reason_to_wire(update.close_reason) as i32,
            reason: reason as i32,
        };
        if let Err(error) = self.write_frame(&encode_frame(MsgType::OrderExec, request.req_id, &msg))
        {
            warn!(%error, "failed to send order execution");
        }
    }

    /// Reply to `request` with an error result.
    pub fn send_error(&self, request: SessionRequest, code: &str, text: &str) {
        let msg = ErrorReply {
            orig_request_type: request.req_type as u8 as u32,
            code: code.to_string(),
            text: text.to_string(),
        };
        if let Err(error) = self.write_frame(&encode_frame(MsgType::Error, request.req_id, &msg)) {
            warn!(%error, "failed to send error reply");
        }
    }

    pub fn send_order_fill(&self, order_id: &str, fill: &OrderFill) -> Result<(), SocketError> {
        let msg = OrderFillReport {
            order_id: order_id.to_string(),
            size: fill.size,
            price: fill.price,
            fully_filled: fill.is_fully_filled,
        };
        self.write_frame(&encode_frame(MsgType::OrderFill, 0, &msg))
    }

    pub fn send_order_unsol_cancel(
        &self,
        order_id: &str,
        update: &OrderUpdate,
    ) -> Result<(), SocketError> {
        let msg = OrderExecution {
            order_id: order_id.to_string(),
            ext_order_id: update.ext_order_id.clone(),
            order_state: update
                .state
                .map(|state| convert::order_state_to_wire(state) as i32)
                .unwrap_or_default(),
            close_reason: convert::close_reason_to_wire(update.close_reason) as i32,
            reason: OrderUpdateReason::Unsolicited as i32,
        };
        self.write_frame(&encode_frame(MsgType::OrderExec, 0, &msg))
    }

    pub fn send_logon_reply(&self, error: &str) {
        let msg = OmLogonReply {
            error: error.to_string(),
        };
        if let Err(error) = self.write_frame(&encode_frame(MsgType::OmLogon, 0, &msg)) {
            warn!(%error, "failed to send logon reply");
        }
    }
}
