//! A small two-sided quoting strategy, suitable for paper trading or backtests.
//!
//! ```text
//! demo-maker -c config/demo-maker.json
//! ```

use apex::{
    bot::{BotCore, BotLogic},
    error::ApexError,
    runner::strategy_runner,
    services::Services,
    strategy::Strategy,
};
use apex_execution::order::{Order, OrderFill, TimeInForce};
use apex_instrument::{exchange::ExchangeId, instrument::InstrumentQuery, Side};
use apex_integration::config::Config;
use std::{str::FromStr, sync::Arc};
use tracing::info;

/// Quotes both sides a fixed number of ticks away from the last trade, re-quoting when an
/// order closes.
#[derive(Default)]
struct DemoMakerBot {
    quote_offset_ticks: f64,
    quote_notional: f64,
    buy: Option<Arc<Order>>,
    sell: Option<Arc<Order>>,
}

impl DemoMakerBot {
    fn new(quote_offset_ticks: f64, quote_notional: f64) -> Self {
        Self {
            quote_offset_ticks,
            quote_notional,
            ..Default::default()
        }
    }

    fn refresh_quotes(&mut self, bot: &BotCore) {
        if bot.is_stopping() || !bot.market_data_ok() {
            return;
        }

        let last = bot.last_price();
        let tick = bot.instrument().spec.tick_size.as_f64();
        let offset = tick * self.quote_offset_ticks;

        if self.buy.as_ref().map(|o| o.is_closed()).unwrap_or(true) {
            self.buy = self.place(bot, Side::Buy, last - offset);
        }
        if self.sell.as_ref().map(|o| o.is_closed()).unwrap_or(true) {
            self.sell = self.place(bot, Side::Sell, last + offset);
        }
    }

    fn place(&self, bot: &BotCore, side: Side, raw_price: f64) -> Option<Arc<Order>> {
        let price = bot.round_price_passive(raw_price, side);
        let size = bot.round_size(self.quote_notional / price).max(bot.min_order_size(price));

        let order = match bot.create_order(side, size, price, TimeInForce::Gtc, None) {
            Ok(order) => order,
            Err(create_error) => {
                info!(%create_error, "quote skipped");
                return None;
            }
        };
        if order.send().is_err() {
            return None;
        }
        Some(order)
    }
}

impl BotLogic for DemoMakerBot {
    fn on_init(&mut self, bot: &BotCore) {
        info!(ticker = %bot.ticker(), "demo maker starting");
    }

    fn on_timer(&mut self, bot: &BotCore) {
        self.refresh_quotes(bot);
    }

    fn on_order_fill(&mut self, bot: &BotCore, order: &Arc<Order>, fill: &OrderFill) {
        info!(
            order_id = %order.order_id(),
            side = %order.side(),
            price = fill.price,
            size = fill.size,
            net = bot.position().net_qty(),
            "fill"
        );
    }

    fn on_order_closed(&mut self, bot: &BotCore, _order: &Arc<Order>) {
        self.refresh_quotes(bot);
    }
}

fn build_strategy(config: &Config, services: &Arc<Services>) -> Result<Strategy, ApexError> {
    let strategy = Strategy::new(Arc::clone(services), &config.get_string("code")?)?;

    let offset = config.get_uint_or("quote_offset_ticks", 5) as f64;
    let notional = config.get_uint_or("quote_notional", 50) as f64;

    let instruments = config.sub_config("instruments")?;
    for index in 0..instruments.array_len() {
        let entry = instruments.array_item(index)?;
        let exchange = ExchangeId::from_str(&entry.get_string("exchange")?)
            .map_err(|parse_error| ApexError::BadConfig(parse_error.to_string()))?;
        let query = InstrumentQuery::new(exchange, entry.get_string("symbol")?);

        strategy.create_bot_for(&query, Box::new(DemoMakerBot::new(offset, notional)))?;
    }

    Ok(strategy)
}

fn main() {
    std::process::exit(strategy_runner(build_strategy));
}
