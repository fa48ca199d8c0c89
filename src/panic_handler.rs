use log::error;
use std::io::{self, Write};
use std::panic;

pub fn initialize_panic_handler() {
    better_panic::install();

    let default_hook = panic::take_hook();
    panic::set_hook(Box::new(move |panic_info| {
        // the log file is often the only trace a batch run leaves
        error!("Panic: {panic_info}");
        log::logger().flush();

        default_hook(panic_info);
        let _ = io::stderr().flush();

        std::process::exit(1);
    }));
}
