use std::io::{self, Write};
use std::panic;

use log::error;

/// Install pretty backtraces and log every panic before the default report.
///
/// The hook does not exit: panics inside observers and generators are
/// caught by the document core and must keep unwinding.
pub fn initialize_panic_handler() {
    better_panic::install();

    let default_hook = panic::take_hook();
    panic::set_hook(Box::new(move |panic_info| {
        error!("Panic: {panic_info}");
        log::logger().flush();
        let _ = io::stdout().flush();

        default_hook(panic_info);
    }));
}
