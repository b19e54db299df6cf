//! The production board: wires the hardware surfaces into the engine.
//!
//! One implementation serves both targets: with the co-processor present
//! it runs the full input path, without it (desktop bring-up, missing
//! hardware) it degrades to a synthetic profile that keeps audio flowing.

use std::time::Instant;

use tracing::{debug, info};

use crate::control;
use crate::control::mapping::{Action, EdgeType, MappingKind};
use crate::engine::{Engine, PitchMode, BEAT_DECK, SCRATCH_DECK};
use crate::input::buttons;
use crate::input::encoder::AudioSnapshot;
use crate::input::onboard::{Gesture, GestureContext, OnboardButtons};
use crate::platform::gpio::Pull;
use crate::platform::{HardwareState, PicReadings};

/// Boot confirmation sound, played on the first button press after
/// power-up so the user can hear the unit is alive.
pub const BOOT_SOUND_PATH: &str = "/var/os-version.mp3";

/// The co-processor is read every 5th coordination tick.
const PIC_SKIP_TICKS: u8 = 4;

/// A hardware input platform as the coordination loop sees it.
///
/// One production implementation exists today; a motorised-platter board
/// would add another and advertise `has_motor_control`.
pub trait HardwareInput: Send {
    /// Set up pins and calibration. Returns true when enough hardware is
    /// present to be useful.
    fn init(&mut self, engine: &mut Engine) -> bool;

    /// Called once per coordination tick.
    fn poll(&mut self, engine: &mut Engine);

    /// Called roughly once per second; emits the machine-parseable stats
    /// line.
    fn log_stats(&mut self, engine: &Engine);

    fn has_motor_control(&self) -> bool {
        false
    }

    fn set_motor_speed(&mut self, _speed: f64) {}

    fn set_motor_brake(&mut self, _brake: bool) {}
}

/// Create the hardware for this platform.
pub fn create_hardware() -> Box<dyn HardwareInput> {
    Box::new(BoardInput::open())
}

/// The stock board implementation.
pub struct BoardInput {
    hw: HardwareState,

    /// No button has ever been pressed since power-up.
    first_time: bool,

    /// Cache of the last co-processor read.
    pic_readings: PicReadings,
    onboard: OnboardButtons,

    /// Fader hysteresis state, one per cut channel.
    fader_open1: bool,
    fader_open2: bool,

    /// Co-processor decimation counter.
    pic_skip: u8,

    /// Wall clock for the no-co-processor fallback.
    last_input_time: Option<Instant>,
}

impl BoardInput {
    /// Open all hardware surfaces, degrading per-surface.
    pub fn open() -> Self {
        Self {
            hw: HardwareState::open(),
            first_time: true,
            pic_readings: PicReadings::default(),
            onboard: OnboardButtons::new(),
            fader_open1: false,
            fader_open2: false,
            pic_skip: 0,
            last_input_time: None,
        }
    }

    /// Walk the mapping table and configure every mapped pin.
    fn init_gpio(&mut self, engine: &mut Engine) {
        // Expander pins: ground mappings become driven-low outputs,
        // everything else an input with the mapping's pullup.
        if self.hw.gpio.mcp_present() {
            for pin in 0..16u8 {
                let map = engine
                    .mappings
                    .find_gpio(0, pin, EdgeType::Pressed)
                    .map(|idx| engine.mappings.entry(idx));

                let grounded = map.is_some_and(|m| m.action == Action::Gnd);
                self.hw.gpio.mcp_set_direction(pin, !grounded);
                if grounded {
                    self.hw.gpio.mcp_write(pin, false);
                }

                let pullup = map.is_none_or(|m| m.pullup);
                self.hw.gpio.mcp_set_pullup(pin, pullup);
            }
        }

        // Memory-mapped pins.
        if self.hw.gpio.mmap_present() {
            for port in 1..=6u8 {
                for pin in 0..28u8 {
                    let Some(idx) = engine.mappings.find_gpio(port, pin, EdgeType::Pressed)
                    else {
                        continue;
                    };

                    // Port-1 pins 15/16 carry the expander's I2C bus; any
                    // mapping there is dead once the expander is fitted.
                    if self.hw.gpio.mcp_present() && port == 1 && (pin == 15 || pin == 16) {
                        engine.mappings.mask_action(idx);
                    } else {
                        let pull = if engine.mappings.entry(idx).pullup {
                            Pull::Up
                        } else {
                            Pull::Disabled
                        };
                        self.hw.gpio.mmap_configure_input(port, pin, pull);
                    }
                }
            }
        }
    }

    /// The compact variant strapping pulls port-6 pin-11 high: it has no
    /// volume pots and no onboard buttons.
    fn detect_compact(&self, engine: &mut Engine) {
        if self.hw.gpio.mmap_present() && self.hw.gpio.mmap_read_pin(6, 11) {
            info!("compact board variant detected");
            engine.settings.disable_volume_adc = true;
            engine.settings.disable_pic_buttons = true;
        }
    }

    /// Run every IO mapping's debounce machine against the current pins.
    fn process_gpio_buttons(&mut self, engine: &mut Engine) {
        let mcp_present = self.hw.gpio.mcp_present();
        let mmap_present = self.hw.gpio.mmap_present();
        let mcp_pins = if mcp_present {
            self.hw.gpio.mcp_read_all()
        } else {
            0
        };

        // Shift is sampled once so every mapping in this pass agrees.
        let shifted_at_start = engine.input_state.is_shifted();
        let debounce_time = engine.settings.debounce_time;
        let hold_time = engine.settings.hold_time;

        for idx in 0..engine.mappings.len() {
            let map = engine.mappings.entry(idx);
            if map.kind != MappingKind::Io {
                continue;
            }
            if map.port == 0 && !mcp_present {
                continue;
            }

            let pin_value = if map.port == 0 {
                (mcp_pins >> map.pin) & 0x01 != 0
            } else if mmap_present {
                self.hw.gpio.mmap_read_pin(map.port, map.pin)
            } else {
                false
            };

            let mut bs = *engine.mappings.state_mut(idx);

            // Very first press after power-up on a scratch volume rocker:
            // play the boot sound instead of the mapped action.
            if bs.debounce == 0
                && pin_value
                && self.first_time
                && map.deck == SCRATCH_DECK
                && matches!(map.action, Action::VolUp | Action::VolDown)
            {
                engine.load_track(BEAT_DECK, std::path::Path::new(BOOT_SOUND_PATH));
                engine
                    .scratch_deck
                    .player
                    .input
                    .set_volume_knob(0.0);
                continue;
            }

            let fire = buttons::step(
                &mut bs,
                pin_value,
                map,
                shifted_at_start,
                debounce_time,
                hold_time,
            );
            *engine.mappings.state_mut(idx) = bs;

            if fire {
                debug!(
                    "mapping port={} pin={} edge={:?} action={:?} fired",
                    map.port, map.pin, map.edge, map.action
                );
                control::dispatch(map, None, engine);
            }
        }
    }

    /// Full co-processor pass: ADC faders, crossfader, onboard gestures.
    fn process_pic_inputs(&mut self, engine: &mut Engine) {
        self.pic_readings = self.hw.pic.read_all();

        self.process_gpio_buttons(engine);

        let adc = self.pic_readings.adc;
        let disable_volume_adc = engine.settings.disable_volume_adc;
        let open_point = engine.settings.fader_open_point;
        let close_point = engine.settings.fader_close_point;
        let cut_beats = engine.settings.cut_beats;

        let (mut fader_target0, mut fader_target1) = if disable_volume_adc {
            (
                engine.beat_deck.player.input.volume_knob(),
                engine.scratch_deck.player.input.volume_knob(),
            )
        } else {
            (f64::from(adc[2]) / 1024.0, f64::from(adc[3]) / 1024.0)
        };

        // Hysteresis: the cut-in point depends on whether the channel is
        // currently open.
        let cut_point1 = if self.fader_open1 { close_point } else { open_point };
        let cut_point2 = if self.fader_open2 { close_point } else { open_point };
        self.fader_open1 = true;
        self.fader_open2 = true;

        if adc[0] < cut_point1 {
            if cut_beats == 1 {
                fader_target0 = 0.0;
            } else {
                fader_target1 = 0.0;
            }
            self.fader_open1 = false;
        }
        if adc[1] < cut_point2 {
            if cut_beats == 2 {
                fader_target0 = 0.0;
            } else {
                fader_target1 = 0.0;
            }
            self.fader_open2 = false;
        }

        engine.beat_deck.player.input.set_crossfader(fader_target0);
        engine
            .scratch_deck
            .player
            .input
            .set_crossfader(fader_target1);

        engine.crossfader.update(adc[0]);

        if !engine.settings.disable_pic_buttons {
            let ctx = GestureContext {
                first_time: self.first_time,
                pitch_mode_active: engine.input_state.pitch_mode().active(),
                scratch_files_present: engine.scratch_deck.nav.files_present,
                beat_files_present: engine.beat_deck.nav.files_present,
            };
            let hold_time = engine.settings.hold_time.max(0) as u32;
            if let Some(gesture) = self.onboard.step(self.pic_readings.buttons, ctx, hold_time) {
                self.apply_gesture(gesture, engine);
            }
        }
    }

    fn apply_gesture(&mut self, gesture: Gesture, engine: &mut Engine) {
        debug!("onboard gesture {gesture:?}");
        match gesture {
            Gesture::BootSound => {
                engine.load_track(BEAT_DECK, std::path::Path::new(BOOT_SOUND_PATH));
            }
            Gesture::ScratchPrevFile => engine.prev_file(SCRATCH_DECK),
            Gesture::ScratchNextFile => engine.next_file(SCRATCH_DECK),
            Gesture::ScratchPrevFolder => engine.prev_folder(SCRATCH_DECK),
            Gesture::ScratchNextFolder => engine.next_folder(SCRATCH_DECK),
            Gesture::ScratchRandomFile => engine.random_file(SCRATCH_DECK),
            Gesture::BeatPrevFile => engine.prev_file(BEAT_DECK),
            Gesture::BeatNextFile => engine.next_file(BEAT_DECK),
            Gesture::BeatPrevFolder => engine.prev_folder(BEAT_DECK),
            Gesture::BeatNextFolder => engine.next_folder(BEAT_DECK),
            Gesture::BeatRandomFile => engine.random_file(BEAT_DECK),
            Gesture::PitchModeScratch => engine.input_state.set_pitch_mode(PitchMode::Scratch),
            Gesture::PitchModeBeat => engine.input_state.set_pitch_mode(PitchMode::Beat),
            Gesture::PitchModeOff => engine.input_state.set_pitch_mode(PitchMode::Off),
            Gesture::ShiftLatch => engine.input_state.toggle_shift(),
            Gesture::RecordBeat => engine.record(BEAT_DECK),
        }
    }

    /// Feed the encoder engine with this tick's sensor and audio state.
    fn process_encoder(&mut self, engine: &mut Engine) {
        let raw = self.hw.encoder.read_angle();
        let audio = AudioSnapshot {
            scratch_position: engine.audio.position(SCRATCH_DECK),
            motor_speed: engine.audio.motor_speed(SCRATCH_DECK),
        };
        let pitch_mode = engine.input_state.pitch_mode();
        let beat_input = engine.beat_deck.player.input.clone();
        let scratch_input = engine.scratch_deck.player.input.clone();

        engine.scratch_deck.encoder.update(
            raw,
            self.pic_readings.cap_touched,
            pitch_mode,
            audio,
            &engine.settings,
            &beat_input,
            &scratch_input,
        );
    }

    /// Synthetic input profile so desktop builds keep producing audio.
    fn poll_fallback(&mut self, engine: &mut Engine) {
        engine.scratch_deck.player.input.set_touched(true);
        engine.beat_deck.player.input.set_crossfader(0.0);
        engine.scratch_deck.player.input.set_crossfader(0.5);
        engine.beat_deck.player.input.set_just_play(true);
        engine.beat_deck.player.input.reset_pitch();

        // Advance the scratch target at wall-clock speed.
        let now = Instant::now();
        if let Some(last) = self.last_input_time {
            let input = &engine.scratch_deck.player.input;
            let dt = now.duration_since(last).as_secs_f64();
            input.set_target_position(input.target_position() + dt);
        }
        self.last_input_time = Some(now);

        // GPIO buttons may still be wired even without the co-processor.
        self.process_gpio_buttons(engine);
    }
}

impl HardwareInput for BoardInput {
    fn init(&mut self, engine: &mut Engine) -> bool {
        self.init_gpio(engine);

        info!(
            "settings: platter_enabled={}, platter_speed={}, jog_reverse={}",
            engine.settings.platter_enabled,
            engine.settings.platter_speed,
            engine.settings.jog_reverse
        );

        engine.crossfader.set_calibration(
            engine.settings.crossfader_adc_min,
            engine.settings.crossfader_adc_max,
        );

        self.detect_compact(engine);

        self.hw.any_present()
    }

    fn poll(&mut self, engine: &mut Engine) {
        if self.hw.pic.present() {
            self.pic_skip += 1;
            if self.pic_skip > PIC_SKIP_TICKS {
                self.pic_skip = 0;
                self.process_pic_inputs(engine);
                self.first_time = false;
            }
            self.process_encoder(engine);
        } else {
            self.poll_fallback(engine);
        }
    }

    fn log_stats(&mut self, engine: &Engine) {
        let dsp = engine.audio.stats();
        let adc = self.pic_readings.adc;
        let buttons = self.pic_readings.buttons;

        info!(
            target: "stats",
            "ADCS: {:04}, {:04}, {:04}, {:04} | XF: {:.2} | \
             DSP: {:.1}% (peak: {:.1}%, {:.0}us/{:.0}us, xruns: {}) | \
             Enc: {:04} Cap: {} Buttons: {},{},{},{}",
            adc[0],
            adc[1],
            adc[2],
            adc[3],
            engine.crossfader.position(),
            dsp.load_percent,
            dsp.load_peak,
            dsp.process_time_us,
            dsp.budget_time_us,
            dsp.xruns,
            engine.scratch_deck.encoder.angle,
            u8::from(engine.scratch_deck.player.input.touched()),
            u8::from(buttons[0]),
            u8::from(buttons[1]),
            u8::from(buttons[2]),
            u8::from(buttons[3]),
        );
    }
}
