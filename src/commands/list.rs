//! List command implementation

use qspif_dummy::Preset;

/// List the emulated device models
pub fn list_presets() {
    println!("Emulated devices:");
    println!();
    for preset in Preset::ALL {
        let config = preset.config();
        println!(
            "  {:12} {:>3} MiB, {} fast read mode(s){}",
            preset.name(),
            config.size / (1024 * 1024),
            config.read_ops.len(),
            if config.qpi { ", QPI" } else { "" }
        );
    }
}
