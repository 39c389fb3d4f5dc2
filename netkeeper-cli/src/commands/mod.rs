mod backup;
mod device;
mod schedule;
mod serve;

// Device commands
pub use device::{add_device, delete_device, list_devices, update_device};

// Backup commands
pub use backup::{
    delete_backup, list_backups, print_result, run_backup, run_global_backup, show_backup,
};

// Schedule commands
pub use schedule::{add_schedule, delete_schedule, list_schedules, toggle_schedule};

// Serve command
pub use serve::run_serve;
