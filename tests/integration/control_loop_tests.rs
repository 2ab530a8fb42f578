//! Measurement → handoff → actuator pipeline under the supervisor.

use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

use crate::mock_bus::{SimBus, TracePin};

use embedded_hal::digital::{ErrorType, OutputPin};
use thermolog::Error;
use thermolog::app::ports::{NoTrigger, RecordSink, SafeOff};
use thermolog::app::service::{CommandSlots, MeasurementTask};
use thermolog::config::{
    ActuatorConfig, DEFAULT_HIH_CHANNELS, RuntimeConfig, SamplingConfig, SystemConfig,
};
use thermolog::control::ActuatorKind;
use thermolog::control::law::ThermalController;
use thermolog::drivers::actuator::SharedLine;
use thermolog::protocol::tca954x::MuxFamily;
use thermolog::record::Record;
use thermolog::sampling::{SamplingEngine, WaitPolicy};
use thermolog::scheduler::ActuatorScheduler;
use thermolog::sensors::BusSampler;
use thermolog::sensors::multiplexer::ChannelMultiplexer;
use thermolog::supervisor::{ShutdownReport, Supervisor};

/// Record sink the test can read while the task owns it.
#[derive(Clone, Default)]
struct SharedSink(Arc<Mutex<Vec<Record>>>);

impl RecordSink for SharedSink {
    fn write(&mut self, record: &Record) {
        self.0.lock().unwrap().push(record.clone());
    }
}

/// Output line whose high write always fails.
struct BrokenPin;

impl ErrorType for BrokenPin {
    type Error = embedded_hal::digital::ErrorKind;
}

impl OutputPin for BrokenPin {
    fn set_low(&mut self) -> Result<(), Self::Error> {
        Ok(())
    }

    fn set_high(&mut self) -> Result<(), Self::Error> {
        Err(embedded_hal::digital::ErrorKind::Other)
    }
}

fn runtime() -> RuntimeConfig {
    SystemConfig {
        sampling: SamplingConfig {
            meas_period_ms: 2,
            avg_period_ms: 6,
            settle_delay_ms: 0,
            wait_policy: WaitPolicy::Sleep,
            discard_leading_ticks: 0,
        },
        actuators: ActuatorConfig {
            period_ms: 20,
            grace_ms: 0,
        },
        shutdown_timeout_ms: 2_000,
        ..SystemConfig::default()
    }
    .validate()
    .unwrap()
}

/// Every sensor at the same temperature.
fn bus_at(celsius: f64) -> SimBus {
    let mut bus = SimBus::new(MuxFamily::DEFAULT_ADDRESS).with_adc(0x48, [1.72; 4]);
    for &ch in &DEFAULT_HIH_CHANNELS {
        bus = bus.with_hih(ch, 45.0, celsius);
    }
    bus
}

fn measurement(
    bus: &SimBus,
    rt: &RuntimeConfig,
    sink: SharedSink,
    slots: CommandSlots,
) -> MeasurementTask<BusSampler<SimBus>, SharedSink, NoTrigger> {
    let mux = ChannelMultiplexer::new(bus.clone(), MuxFamily::Tca9548a, MuxFamily::DEFAULT_ADDRESS, false).unwrap();
    let sampler = BusSampler::new(mux, rt.descriptors.clone(), rt.settle_delay).unwrap();
    MeasurementTask::new(
        SamplingEngine::new(sampler, rt.sampling),
        ThermalController::new(rt.control.clone()),
        sink,
        NoTrigger,
        slots,
    )
    .with_record_every(rt.record_every)
}

/// Run the full system for `run_for`, then stop it.
fn run_system(celsius: f64, run_for: Duration) -> (ShutdownReport, TracePin, TracePin, Vec<Record>) {
    let rt = runtime();
    let bus = bus_at(celsius);
    let sink = SharedSink::default();

    let (cool_pin, heat_pin) = (TracePin::default(), TracePin::default());
    let cool_line = Arc::new(SharedLine::new(ActuatorKind::Cool, cool_pin.clone()));
    let heat_line = Arc::new(SharedLine::new(ActuatorKind::Heat, heat_pin.clone()));

    let lines: Vec<Arc<dyn SafeOff>> = vec![cool_line.clone(), heat_line.clone()];
    let mut sup = Supervisor::new(lines, rt.shutdown_timeout);
    let slots = sup.slots();

    let measure = measurement(&bus, &rt, sink.clone(), slots.clone());
    let cool = ActuatorScheduler::new(cool_line, slots.cool.clone(), rt.actuators);
    let heat = ActuatorScheduler::new(heat_line, slots.heat.clone(), rt.actuators);
    sup.start(measure, cool, heat).unwrap();
    assert_eq!(sup.task_names(), ["measure", "cool", "heat"]);

    thread::sleep(run_for);
    assert!(!sup.is_cancelled(), "no task should have failed");
    let report = sup.stop();
    let records = sink.0.lock().unwrap().clone();
    (report, cool_pin, heat_pin, records)
}

#[test]
fn warm_enclosure_drives_cooling() {
    let (report, cool, _heat, records) = run_system(23.75, Duration::from_millis(200));

    assert!(report.is_clean(2), "{report:?}");
    assert_eq!(report.joined.len(), 3);
    assert!(cool.ever_high(), "cool line must have been asserted");
    assert!(!cool.level(), "cool line must end low");

    assert!(!records.is_empty());
    let last = records.last().unwrap();
    assert_eq!(last.values.len(), 16);
    assert!((last.values[5] - 23.75).abs() < 0.02);
    assert!(!last.triggered);
}

#[test]
fn cold_enclosure_drives_heating_only() {
    let (report, cool, heat, _) = run_system(20.75, Duration::from_millis(200));

    assert!(report.is_clean(2), "{report:?}");
    assert!(!cool.ever_high(), "cool line must stay low when cold");
    assert!(heat.ever_high(), "heat line must have been asserted");
    assert!(!heat.level());
}

#[test]
fn lines_start_forced_off() {
    let (_, cool, heat, _) = run_system(22.75, Duration::from_millis(30));
    // first write on each line is the forced-off at start
    assert!(!cool.trace.lock().unwrap()[0].1);
    assert!(!heat.trace.lock().unwrap()[0].1);
}

#[test]
fn actuator_failure_stops_everything_and_forces_lines_off() {
    let rt = runtime();
    let bus = bus_at(20.75);

    let cool_pin = TracePin::default();
    let cool_line = Arc::new(SharedLine::new(ActuatorKind::Cool, cool_pin.clone()));
    let heat_line = Arc::new(SharedLine::new(ActuatorKind::Heat, BrokenPin));

    let lines: Vec<Arc<dyn SafeOff>> = vec![cool_line.clone(), heat_line.clone()];
    let mut sup = Supervisor::new(lines, rt.shutdown_timeout);
    let slots = sup.slots();

    let measure = measurement(&bus, &rt, SharedSink::default(), slots.clone());
    let cool = ActuatorScheduler::new(cool_line, slots.cool.clone(), rt.actuators);
    let heat = ActuatorScheduler::new(heat_line, slots.heat.clone(), rt.actuators);
    sup.start(measure, cool, heat).unwrap();

    // returns once the heat task fails
    sup.wait();
    let report = sup.stop();
    assert_eq!(report.failed, ["heat"]);
    assert!(report.abandoned.is_empty());
    assert_eq!(report.lines_forced_off, 2);
    assert!(!cool_pin.level());
}

#[test]
fn tasks_on_foreign_slots_are_refused() {
    let rt = runtime();
    let bus = bus_at(22.75);
    let cool_pin = TracePin::default();
    let cool_line = Arc::new(SharedLine::new(ActuatorKind::Cool, cool_pin.clone()));
    let heat_line = Arc::new(SharedLine::new(ActuatorKind::Heat, TracePin::default()));

    let lines: Vec<Arc<dyn SafeOff>> = vec![cool_line.clone(), heat_line.clone()];
    let mut sup = Supervisor::new(lines, rt.shutdown_timeout);
    let foreign = CommandSlots::new();

    let measure = measurement(&bus, &rt, SharedSink::default(), foreign.clone());
    let cool = ActuatorScheduler::new(cool_line, foreign.cool.clone(), rt.actuators);
    let heat = ActuatorScheduler::new(heat_line, foreign.heat.clone(), rt.actuators);
    assert!(matches!(sup.start(measure, cool, heat), Err(Error::Task(_))));
    assert!(sup.task_names().is_empty());
    assert!(cool_pin.trace.lock().unwrap().is_empty(), "nothing may run");
}
