//! Bus sampler and averaging engine against the simulated bus.

use std::sync::Arc;
use std::time::Duration;

use crate::mock_bus::SimBus;

use thermolog::Error;
use thermolog::app::ports::{NoTrigger, SamplePort};
use thermolog::channels::CancelToken;
use thermolog::config::{DEFAULT_HIH_CHANNELS, RuntimeConfig, SamplingConfig, SystemConfig};
use thermolog::error::BusError;
use thermolog::protocol::tca954x::MuxFamily;
use thermolog::sampling::{
    AveragedReading, SamplingEngine, TraceLimits, WaitPolicy, WindowOutcome, triggered_trace,
};
use thermolog::sensors::BusSampler;
use thermolog::sensors::descriptor::{DeviceDescriptor, Quantity};
use thermolog::sensors::multiplexer::ChannelMultiplexer;

const ADC_LSB: f64 = 2.048 / 32_768.0;
const HIH_TEMP_STEP: f64 = 165.0 / 16_382.0;

fn fast_sampling() -> SamplingConfig {
    SamplingConfig {
        meas_period_ms: 2,
        avg_period_ms: 6,
        settle_delay_ms: 0,
        wait_policy: WaitPolicy::Sleep,
        discard_leading_ticks: 0,
    }
}

fn runtime() -> RuntimeConfig {
    SystemConfig {
        sampling: fast_sampling(),
        ..SystemConfig::default()
    }
    .validate()
    .unwrap()
}

/// Default enclosure: ADC at 0x48, one HIH8121 per default switch channel.
/// Sensor `i` reads `40 + i` %RH and `22 + i` °C.
fn enclosure_bus() -> SimBus {
    let mut bus = SimBus::new(MuxFamily::DEFAULT_ADDRESS).with_adc(0x48, [1.75, 1.72, 1.70, 2.0]);
    for (i, &ch) in DEFAULT_HIH_CHANNELS.iter().enumerate() {
        bus = bus.with_hih(ch, 40.0 + i as f64, 22.0 + i as f64);
    }
    bus
}

fn engine(bus: &SimBus, rt: &RuntimeConfig) -> SamplingEngine<BusSampler<SimBus>> {
    let mux = ChannelMultiplexer::new(bus.clone(), MuxFamily::Tca9548a, MuxFamily::DEFAULT_ADDRESS, true).unwrap();
    let sampler = BusSampler::new(mux, rt.descriptors.clone(), rt.settle_delay).unwrap();
    SamplingEngine::new(sampler, rt.sampling)
}

fn ready(outcome: WindowOutcome) -> AveragedReading {
    match outcome {
        WindowOutcome::Ready(r) => r,
        other => panic!("expected a reading, got {other:?}"),
    }
}

#[test]
fn default_layout_reads_every_channel() {
    let bus = enclosure_bus();
    let rt = runtime();
    let mut engine = engine(&bus, &rt);
    engine.prime().unwrap();

    let r = ready(engine.run_window(&CancelToken::new()).unwrap());
    assert_eq!(r.values().len(), 16);
    assert!((1..=3).contains(&r.ticks()));
    assert_eq!(r.stale_samples(), 0, "primed sensors must report fresh data");

    // ADC inputs, bias 1.72 V removed
    assert!((r.value(0).unwrap() - 0.03).abs() < 2.0 * ADC_LSB);
    assert!(r.value(1).unwrap().abs() < 2.0 * ADC_LSB);
    assert!((r.value(2).unwrap() + 0.02).abs() < 2.0 * ADC_LSB);
    assert!((r.value(3).unwrap() - 0.28).abs() < 2.0 * ADC_LSB);

    // humidity/temperature pairs in switch-channel order
    for i in 0..DEFAULT_HIH_CHANNELS.len() {
        let hum = r.value(4 + 2 * i).unwrap();
        let temp = r.value(5 + 2 * i).unwrap();
        assert!((hum - (40.0 + i as f64)).abs() < 0.01, "humidity {i}: {hum}");
        assert!((temp - (22.0 + i as f64)).abs() < HIH_TEMP_STEP, "temperature {i}: {temp}");
    }
}

#[test]
fn switch_is_rewritten_only_on_channel_change() {
    let bus = enclosure_bus();
    let rt = runtime();
    let mut engine = engine(&bus, &rt);
    engine.prime().unwrap();

    let before = bus.state().mux_writes;
    let r = ready(engine.run_window(&CancelToken::new()).unwrap());
    let writes = bus.state().mux_writes - before;
    // six sensors, two reads each, one mask write per sensor per tick
    assert_eq!(writes, 6 * r.ticks());
    assert_eq!(bus.state().mux_mask, 1 << 7);
}

#[test]
fn humidity_sensors_are_pipelined() {
    let bus = enclosure_bus();
    let rt = runtime();
    let mut engine = engine(&bus, &rt);
    engine.prime().unwrap();
    let r = ready(engine.run_window(&CancelToken::new()).unwrap());

    let state = bus.state();
    let hih = &state.hihs[&1];
    // one request at priming, then one after every fetch
    assert_eq!(hih.fetches, 2 * r.ticks());
    assert_eq!(hih.requests, 1 + hih.fetches);
}

#[test]
fn bus_fault_discards_window_and_sampling_recovers() {
    let bus = enclosure_bus();
    let rt = runtime();
    let mut engine = engine(&bus, &rt);
    engine.prime().unwrap();

    bus.fail_next(1);
    let cancel = CancelToken::new();
    match engine.run_window(&cancel).unwrap() {
        WindowOutcome::Rejected(e) => {
            assert!(matches!(e, Error::Bus(BusError::Transfer { address: 0x48, .. })));
            assert!(e.is_transient());
        }
        other => panic!("expected rejection, got {other:?}"),
    }
    assert_eq!(engine.stats().windows_rejected, 1);

    let r = ready(engine.run_window(&cancel).unwrap());
    assert_eq!(r.values().len(), 16);
}

#[test]
fn switch_reset_is_recovered_on_next_window() {
    // both channels behind the same switch port, so the mask is cached
    let bus = SimBus::new(MuxFamily::DEFAULT_ADDRESS).with_hih(1, 45.0, 22.0);
    let descriptors: Arc<[DeviceDescriptor]> = [Quantity::Humidity, Quantity::Temperature]
        .into_iter()
        .map(|q| DeviceDescriptor::humidity(q).mux_channel(1).build().unwrap())
        .collect();
    let rt = runtime();
    let mux = ChannelMultiplexer::new(bus.clone(), MuxFamily::Tca9548a, MuxFamily::DEFAULT_ADDRESS, false).unwrap();
    let sampler = BusSampler::new(mux, descriptors, rt.settle_delay).unwrap();
    let mut engine = SamplingEngine::new(sampler, rt.sampling);
    engine.prime().unwrap();

    let cancel = CancelToken::new();
    ready(engine.run_window(&cancel).unwrap());
    let writes = bus.state().mux_writes;

    // switch power-cycles and comes back with every channel off
    bus.state().mux_mask = 0;
    assert!(matches!(
        engine.run_window(&cancel).unwrap(),
        WindowOutcome::Rejected(Error::Bus(BusError::Transfer { address: 0x27, .. }))
    ));

    let r = ready(engine.run_window(&cancel).unwrap());
    assert!((r.value(1).unwrap() - 22.0).abs() < HIH_TEMP_STEP);
    assert_eq!(bus.state().mux_writes, writes + 1);
    assert_eq!(bus.state().mux_mask, 1 << 1);
}

#[test]
fn missing_sensor_is_a_transient_fault() {
    let bus = enclosure_bus();
    bus.state().hihs.remove(&7);
    let rt = runtime();
    let mut engine = engine(&bus, &rt);

    let prime = engine.prime().unwrap_err();
    assert!(prime.is_transient());
    assert!(matches!(
        engine.run_window(&CancelToken::new()).unwrap(),
        WindowOutcome::Rejected(Error::Bus(BusError::Transfer { address: 0x27, .. }))
    ));
}

#[test]
fn out_of_bound_temperature_rejects_the_window() {
    let bus = enclosure_bus();
    bus.set_temperature(1, 80.0);
    let rt = runtime();
    let mut engine = engine(&bus, &rt);
    engine.prime().unwrap();

    match engine.run_window(&CancelToken::new()).unwrap() {
        WindowOutcome::Rejected(Error::OutlierRejected { channel, value }) => {
            assert_eq!(channel, 5);
            assert!((value - 80.0).abs() < HIH_TEMP_STEP);
        }
        other => panic!("expected outlier rejection, got {other:?}"),
    }
}

#[test]
fn json_config_without_switch() {
    let json = r#"{
        "sampling": {
            "meas_period_ms": 2,
            "avg_period_ms": 4,
            "settle_delay_ms": 0,
            "wait_policy": { "mode": "sleep" }
        },
        "multiplexer": { "family": null },
        "control": { "estimate_channels": [0] },
        "devices": [
            { "kind": "adc", "label": "sample-in", "strap": "vdd", "input": 5 }
        ]
    }"#;
    let rt = SystemConfig::from_json(json).unwrap().validate().unwrap();
    assert_eq!(rt.descriptors[0].address(), 0x49);
    assert_eq!(rt.descriptors[0].label(), "sample-in");

    let bus = SimBus::new(0x70).with_adc(0x49, [0.0, 1.25, 0.0, 0.0]);
    let sampler = BusSampler::new(
        ChannelMultiplexer::passthrough(bus.clone()),
        rt.descriptors.clone(),
        rt.settle_delay,
    )
    .unwrap();
    assert_eq!(sampler.channels().len(), 1);

    let mut engine = SamplingEngine::new(sampler, rt.sampling);
    let r = ready(engine.run_window(&CancelToken::new()).unwrap());
    assert!((r.value(0).unwrap() - 1.25).abs() < ADC_LSB);
    assert_eq!(bus.state().mux_writes, 0);
}

#[test]
fn cancelled_engine_stops_before_sampling() {
    let bus = enclosure_bus();
    let rt = runtime();
    let mut engine = engine(&bus, &rt);
    let cancel = CancelToken::new();
    cancel.cancel();
    let before = bus.state().transactions;
    assert_eq!(engine.run_window(&cancel).unwrap(), WindowOutcome::Cancelled);
    assert_eq!(bus.state().transactions, before);
}

#[test]
fn trace_reads_raw_rows_from_the_bus() {
    let bus = enclosure_bus();
    let rt = runtime();
    let mux = ChannelMultiplexer::new(bus.clone(), MuxFamily::Tca9548a, MuxFamily::DEFAULT_ADDRESS, false).unwrap();
    let mut sampler = BusSampler::new(mux, rt.descriptors.clone(), rt.settle_delay).unwrap();
    sampler.prime().unwrap();

    let limits = TraceLimits {
        max_samples: Some(3),
        ..TraceLimits::default()
    };
    let trace = triggered_trace(
        &mut sampler,
        &mut NoTrigger,
        Duration::ZERO,
        limits,
        WaitPolicy::Sleep,
        &CancelToken::new(),
    )
    .unwrap();
    assert!(!trace.triggered);
    assert_eq!(trace.rows.len(), 3);
    for row in &trace.rows {
        assert_eq!(row.values.len(), 16);
        // raw ADC volts: bias not removed
        assert!((row.values[0] - 1.75).abs() < ADC_LSB);
        assert!((row.values[5] - 22.0).abs() < HIH_TEMP_STEP);
    }
}
