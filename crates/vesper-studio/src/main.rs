mod orbit;
mod scripts;

use anyhow::Result;
use vesper_engine::compositor::{Layer, LayerKind};
use vesper_engine::config::{EngineConfig, XrMode};
use vesper_engine::device::GpuInit;
use vesper_engine::host::{Host, HostApp, HostCtx, WindowOptions};
use vesper_engine::logging::{init_logging, LoggingConfig};
use vesper_engine::pose::{PoseProvider, SoftwareHandle, SoftwareSource};
use vesper_engine::scheduler::TickReport;
use vesper_engine::xr::IDENTITY;

use orbit::OrbitDriver;
use scripts::{HeadTintScript, PulseScript};

fn main() -> Result<()> {
    init_logging(LoggingConfig::default());

    let config = EngineConfig::from_env();
    log::info!("vesper studio: {config:?}");

    let (pose, handle) = match config.xr_mode {
        XrMode::Off => (PoseProvider::inactive(), None),
        XrMode::Device => {
            log::warn!("no headset runtime linked into this build; using the software pose");
            software_pose(&config)?
        }
        XrMode::SoftwareFallback => software_pose(&config)?,
    };

    let app = Studio {
        xr: config.xr_mode != XrMode::Off,
        handle,
    };
    Host::run(config, GpuInit::default(), pose, app)
}

fn software_pose(config: &EngineConfig) -> Result<(PoseProvider, Option<SoftwareHandle>)> {
    let (source, handle) = SoftwareSource::new();
    let provider = PoseProvider::spawn(source, config.pose_budget)?;
    Ok((provider, Some(handle)))
}

struct Studio {
    xr: bool,
    handle: Option<SoftwareHandle>,
}

impl HostApp for Studio {
    fn start(&mut self, host: &mut HostCtx<'_>) -> Result<()> {
        let panel = host.open_window(
            WindowOptions {
                title: "vesper studio".into(),
                priority: 1,
                ..WindowOptions::default()
            },
            PulseScript::new([0.1, 0.35, 0.6, 1.0]),
        )?;

        if !self.xr {
            return Ok(());
        }

        host.open_window(
            WindowOptions {
                title: "vesper studio (XR mirror)".into(),
                xr: true,
                ..WindowOptions::default()
            },
            HeadTintScript,
        )?;

        let Some(scheduler) = host.scheduler() else {
            return Ok(());
        };
        if let Some(handle) = self.handle.clone() {
            scheduler.add_timed_resource(OrbitDriver::new(handle, 20.0));
        }

        // The panel floats two meters ahead of the origin.
        let panel_context = scheduler
            .context()
            .windows()
            .contexts_of(panel)
            .first()
            .map(|c| c.id);
        if let Some(source) = panel_context {
            let mut model_view = [0.0; 16];
            model_view[0] = 0.8;
            model_view[5] = 0.45;
            model_view[10] = 1.0;
            model_view[13] = 1.6;
            model_view[14] = -2.0;
            model_view[15] = 1.0;
            scheduler.set_layers(vec![
                Layer::new(LayerKind::Iframe2d, source).with_eyes([model_view; 2], [IDENTITY; 2]),
            ]);
        }
        Ok(())
    }

    fn after_tick(&mut self, _host: &mut HostCtx<'_>, report: &TickReport) {
        if !report.not_ready.is_empty() {
            log::debug!("tick {}: late windows {:?}", report.tick, report.not_ready);
        }
    }
}
