// Application state for HTTP handlers
use crate::application::machine_service::MachineService;
use crate::application::monitor_service::MonitorService;

#[derive(Clone)]
pub struct AppState {
    pub machine_service: MachineService,
    pub monitor_service: MonitorService,
}
