use gust_core::prelude::DelegatedShutdownListener;
use sysinfo::{Pid, ProcessRefreshKind, ProcessesToUpdate, System};

/// Monitor the resource usage of the load generator itself and report high usage.
///
/// This won't stop the run, it just warns the user that the generator may be saturating
/// the machine, in which case the recorded latencies measure the generator as much as the
/// target.
///
/// The CPU usage for the process is collected every [sysinfo::MINIMUM_CPU_UPDATE_INTERVAL]
/// and checked. If it is above 10% with respect to the number of cores then a warning is
/// logged.
pub(crate) fn start_monitor(mut shutdown_listener: DelegatedShutdownListener) {
    std::thread::Builder::new()
        .name("monitor".to_string())
        .spawn(move || {
            let this_process_pid = Pid::from_u32(std::process::id());
            let mut sys = System::new();

            sys.refresh_cpu_all();
            let cpu_count = sys.cpus().len().max(1);

            loop {
                if shutdown_listener.should_shutdown() {
                    break;
                }

                sys.refresh_processes_specifics(
                    ProcessesToUpdate::Some(&[this_process_pid]),
                    true,
                    ProcessRefreshKind::nothing().with_cpu(),
                );

                if let Some(process) = sys.process(this_process_pid) {
                    let usage = (process.cpu_usage() / (cpu_count * 100) as f32) * 100.0;
                    if usage > 10.0 {
                        log::warn!("High CPU usage detected. The load generator is using {:.2}% of the CPU, with {} available cores", usage, cpu_count);
                    }
                }

                std::thread::sleep(sysinfo::MINIMUM_CPU_UPDATE_INTERVAL);
            }
        })
        .expect("Failed to start monitor thread");
}
