//! End-to-end tests for the analytics core

#[cfg(test)]
mod tests {
    use chrono::{TimeZone, Utc};
    use dexmetrics::indicators::{ema, rsi, sma, IndicatorSeries};
    use dexmetrics::portfolio::{Ledger, PortfolioSnapshot};
    use dexmetrics::risk::{recommend, SlippageConfig, SlippageEstimator, SlippageReason};
    use dexmetrics::series::{PriceSeriesAggregator, SeriesConfig};
    use dexmetrics::types::{Candle, InstrumentId, PriceSample, Side, Timeframe, TradeRecord};
    use dexmetrics::{AnalyticsError, AnalyticsSession};
    use rand::rngs::StdRng;
    use rand::seq::SliceRandom;
    use rand::{Rng, SeedableRng};
    use rust_decimal::Decimal;
    use rust_decimal_macros::dec;

    const MIN: i64 = 60_000;

    fn flow() -> InstrumentId {
        InstrumentId::new("flow-usdc")
    }

    fn random_stream(seed: u64, len: usize) -> Vec<PriceSample> {
        let mut rng = StdRng::seed_from_u64(seed);
        let mut ts = 1_700_000_000_000i64;
        let mut price = dec!(1.0000);
        (0..len)
            .map(|_| {
                ts += rng.gen_range(1_000..90_000);
                let step = Decimal::new(rng.gen_range(-200..=200), 4);
                price = (price + step).max(dec!(0.0100));
                PriceSample::new(ts, price).with_volume(Decimal::new(rng.gen_range(0..500), 1))
            })
            .collect()
    }

    fn assert_candle_invariants(candles: &[Candle]) {
        for c in candles {
            assert!(c.high >= c.open.max(c.close), "high below body: {c:?}");
            assert!(c.low <= c.open.min(c.close), "low above body: {c:?}");
            assert!(c.volume >= Decimal::ZERO);
            assert_eq!(c.open_time % c.timeframe.duration_ms(), 0);
        }
        for pair in candles.windows(2) {
            assert!(pair[0].open_time < pair[1].open_time);
        }
    }

    // ============================================================================
    // Price series
    // ============================================================================

    #[test]
    fn test_scenario_a_one_sample_per_bucket() {
        let session = AnalyticsSession::default();
        session.set_timeframe(Timeframe::Min5);
        for (i, price) in [dec!(1.00), dec!(1.02), dec!(0.98), dec!(1.05)]
            .into_iter()
            .enumerate()
        {
            session
                .record_sample(&flow(), PriceSample::new(i as i64 * 5 * MIN, price))
                .unwrap();
        }

        let candles = session.candles(&flow());
        assert_eq!(candles.len(), 4);
        assert!(candles.iter().all(|c| c.open == c.close));
        assert_eq!(session.price_change_pct(&flow()), dec!(5));
        assert_eq!(session.high_24h(&flow()), dec!(1.05));
        assert_eq!(session.low_24h(&flow()), dec!(0.98));
    }

    #[test]
    fn test_candle_invariants_over_generated_streams() {
        for seed in 0..8 {
            let mut agg = PriceSeriesAggregator::new(SeriesConfig {
                max_candles: 500,
                ..SeriesConfig::default()
            });
            for sample in random_stream(seed, 400) {
                agg.record_sample(&flow(), sample).unwrap();
            }
            assert_candle_invariants(&agg.candles(&flow()));

            for tf in Timeframe::ALL {
                agg.set_timeframe(tf);
                let candles = agg.candles(&flow());
                assert!(!candles.is_empty());
                assert_candle_invariants(&candles);
                assert_eq!(agg.indicators(&flow()).len(), candles.len());
            }
        }
    }

    #[test]
    fn test_shuffled_samples_match_sorted() {
        let stream = random_stream(42, 200);
        let mut shuffled = stream.clone();
        shuffled.shuffle(&mut StdRng::seed_from_u64(7));

        let mut sorted_agg = PriceSeriesAggregator::default();
        let mut shuffled_agg = PriceSeriesAggregator::default();
        for s in &stream {
            sorted_agg.record_sample(&flow(), *s).unwrap();
        }
        for s in &shuffled {
            shuffled_agg.record_sample(&flow(), *s).unwrap();
        }

        assert_eq!(sorted_agg.candles(&flow()), shuffled_agg.candles(&flow()));
        assert_eq!(sorted_agg.latest_price(&flow()), shuffled_agg.latest_price(&flow()));
    }

    #[test]
    fn test_retention_bounds_memory() {
        let mut agg = PriceSeriesAggregator::new(SeriesConfig {
            retention_ms: 60 * MIN,
            ..SeriesConfig::default()
        });
        for i in 0..600 {
            agg.record_sample(&flow(), PriceSample::new(i * MIN, dec!(1)))
                .unwrap();
        }
        assert_eq!(agg.sample_count(&flow()), 60);
        let candles = agg.candles(&flow());
        assert!(candles.len() <= 13);
        assert_candle_invariants(&candles);
    }

    #[test]
    fn test_invalid_inputs_are_rejected() {
        let session = AnalyticsSession::default();
        assert_eq!(
            session.record_sample(&flow(), PriceSample::new(0, dec!(0))),
            Err(AnalyticsError::InvalidSample { price: dec!(0) })
        );
        assert!(matches!(
            session.set_timeframe_str("7m"),
            Err(AnalyticsError::InvalidTimeframe(_))
        ));
        assert_eq!(session.timeframe(), Timeframe::Min5);
    }

    // ============================================================================
    // Indicators
    // ============================================================================

    #[test]
    fn test_rsi_bounded_for_arbitrary_sequences() {
        let mut rng = StdRng::seed_from_u64(99);
        for _ in 0..20 {
            let closes: Vec<f64> = (0..120).map(|_| rng.gen_range(0.0..10.0)).collect();
            for value in rsi(&closes, 14).into_iter().flatten() {
                assert!((0.0..=100.0).contains(&value));
            }
        }

        let flat = vec![3.0; 40];
        let values = rsi(&flat, 14);
        assert!(values[..14].iter().all(Option::is_none));
        assert!(values[14..].iter().all(|v| *v == Some(100.0)));
    }

    #[test]
    fn test_moving_averages_undefined_before_period() {
        let closes: Vec<f64> = (1..=40).map(f64::from).collect();
        let sma20 = sma(&closes, 20);
        let ema12 = ema(&closes, 12);
        let ema26 = ema(&closes, 26);

        assert!(sma20[..19].iter().all(Option::is_none));
        assert!(sma20[19..].iter().all(Option::is_some));
        assert!(ema12[..11].iter().all(Option::is_none));
        assert!(ema12[11..].iter().all(Option::is_some));
        assert!(ema26[..25].iter().all(Option::is_none));
        assert!(ema26[25..].iter().all(Option::is_some));

        let series = IndicatorSeries::from_closes(&closes);
        assert_eq!(series.len(), closes.len());
        assert_eq!(series.latest().sma20, Some(30.5));
    }

    // ============================================================================
    // Slippage
    // ============================================================================

    #[test]
    fn test_scenario_c_large_trade_is_clamped() {
        let mut estimator = SlippageEstimator::default();
        for i in 0..10 {
            estimator
                .record_sample(PriceSample::new(i * 10_000, dec!(1.5)))
                .unwrap();
        }
        let rec = estimator.estimate(dec!(50), dec!(1000));

        assert_eq!(rec.volatility_pct, 0.0);
        assert!((rec.size_impact_pct - 5.0).abs() < 1e-9);
        assert!((rec.recommended_pct - 5.0).abs() < 1e-9);
        assert_eq!(rec.reasons, vec![SlippageReason::LargeTradeSize]);
        assert!(rec.is_high_risk);
    }

    #[test]
    fn test_recommendation_monotonic_and_bounded() {
        let config = SlippageConfig::default();
        let grid: Vec<f64> = (0..60).map(|i| i as f64 * 0.1).collect();
        for &vol in &grid {
            let mut prev = f64::MIN;
            for &size in &grid {
                let rec = recommend(vol, size, &config);
                assert!(rec.recommended_pct >= prev);
                assert!(rec.recommended_pct <= config.max_slippage);
                assert!(rec.recommended_pct >= 0.0);
                prev = rec.recommended_pct;
            }
        }
        for &size in &grid {
            let mut prev = f64::MIN;
            for &vol in &grid {
                let rec = recommend(vol, size, &config);
                assert!(rec.recommended_pct >= prev);
                prev = rec.recommended_pct;
            }
        }
    }

    #[test]
    fn test_zero_reserve_is_not_a_fault() {
        let estimator = SlippageEstimator::default();
        let rec = estimator.estimate(dec!(10), Decimal::ZERO);
        assert_eq!(rec.size_impact_pct, 0.0);
        assert_eq!(rec.reasons, vec![SlippageReason::NormalMarketConditions]);
    }

    // ============================================================================
    // Portfolio
    // ============================================================================

    fn random_trades(seed: u64, count: usize) -> Vec<TradeRecord> {
        let mut rng = StdRng::seed_from_u64(seed);
        let instruments = ["flow-usdc", "eth-usdc"];
        let mut holdings = [Decimal::ZERO, Decimal::ZERO];
        let mut trades = Vec::with_capacity(count);

        for i in 0..count {
            let which = rng.gen_range(0..instruments.len());
            let price = Decimal::new(rng.gen_range(50..150), 2);
            let sell = holdings[which] > Decimal::ZERO && rng.gen_bool(0.4);
            let (side, amount) = if sell {
                let wanted = Decimal::new(rng.gen_range(1..500), 1);
                (Side::Sell, wanted.min(holdings[which]))
            } else {
                (Side::Buy, Decimal::new(rng.gen_range(1..1000), 1))
            };
            match side {
                Side::Buy => holdings[which] += amount,
                Side::Sell => holdings[which] -= amount,
            }
            trades.push(
                TradeRecord::new(instruments[which], side, amount, price, i as i64 * MIN)
                    .with_id(format!("t{i}"))
                    .with_fee(Decimal::new(rng.gen_range(0..100), 3)),
            );
        }
        trades
    }

    #[test]
    fn test_scenario_b_average_cost() {
        let session = AnalyticsSession::default();
        session
            .record_trade(TradeRecord::new(flow(), Side::Buy, dec!(10), dec!(2.00), 1))
            .unwrap();
        session
            .record_trade(TradeRecord::new(flow(), Side::Sell, dec!(4), dec!(3.00), 2))
            .unwrap();

        let view = session.position(&flow()).unwrap();
        assert_eq!(view.position.base_amount, dec!(6));
        assert_eq!(view.position.base_avg_cost, dec!(2.00));
        assert_eq!(view.position.realized_pnl, dec!(4.00));

        let stats = session.portfolio_stats();
        assert_eq!(stats.closing_trades, 1);
        assert_eq!(stats.win_rate, Decimal::ONE);
    }

    #[test]
    fn test_replay_is_deterministic() {
        let trades = random_trades(5, 300);
        let exported_at = Utc.timestamp_millis_opt(1_700_000_000_000).unwrap();

        let mut first = Ledger::new();
        let mut second = Ledger::new();
        for t in &trades {
            first.record_trade(t.clone()).unwrap();
        }
        for t in &trades {
            second.record_trade(t.clone()).unwrap();
        }

        let a = serde_json::to_string(&first.snapshot_at(exported_at)).unwrap();
        let b = serde_json::to_string(&second.snapshot_at(exported_at)).unwrap();
        assert_eq!(a, b);

        // Recording order does not matter, only timestamps do
        let mut reversed = Ledger::new();
        let mut pending = trades.clone();
        pending.reverse();
        // Buys first so no intermediate state oversells
        pending.sort_by_key(|t| t.side == Side::Sell);
        for t in pending {
            reversed.record_trade(t).unwrap();
        }
        assert_eq!(reversed.positions(), first.positions());
        assert_eq!(reversed.stats().total_realized_pnl, first.stats().total_realized_pnl);
    }

    #[test]
    fn test_oversell_leaves_ledger_untouched() {
        let mut ledger = Ledger::new();
        ledger
            .record_trade(TradeRecord::new(flow(), Side::Buy, dec!(1), dec!(1), 1))
            .unwrap();
        let before = ledger.stats();
        let err = ledger
            .record_trade(TradeRecord::new(flow(), Side::Sell, dec!(2), dec!(1), 2))
            .unwrap_err();
        assert!(matches!(err, AnalyticsError::InsufficientPosition { .. }));
        assert_eq!(ledger.stats(), before);
    }

    #[test]
    fn test_snapshot_file_roundtrip() {
        let session = AnalyticsSession::default();
        for t in random_trades(11, 50) {
            session.record_trade(t).unwrap();
        }
        session
            .record_sample(&flow(), PriceSample::new(100 * MIN, dec!(1.10)))
            .unwrap();

        let snapshot = session.export_snapshot();
        let path = std::env::temp_dir().join(format!("dexmetrics_{}.json", uuid::Uuid::new_v4()));
        std::fs::write(&path, snapshot.to_json_pretty().unwrap()).unwrap();
        let loaded: PortfolioSnapshot =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        std::fs::remove_file(&path).ok();

        let restored = AnalyticsSession::default();
        restored.restore_snapshot(&loaded).unwrap();
        assert_eq!(restored.positions(), session.positions());
        assert_eq!(restored.portfolio_stats(), session.portfolio_stats());
        assert_eq!(restored.trade_history(Some(5)), session.trade_history(Some(5)));
    }
}
