//! Check ffmpeg presence and encoder availability.

use hudburn_pipeline::encoder::{
    compiled_encoders, detect_encoder, ffmpeg_available, VideoCodec, HARDWARE_CANDIDATES,
};

pub fn run() -> anyhow::Result<()> {
    println!("Hudburn System Check");
    println!("{}", "=".repeat(50));

    if !ffmpeg_available() {
        println!("[FAIL] ffmpeg: not found on PATH");
        println!();
        println!("Install ffmpeg and re-run this check.");
        return Ok(());
    }
    println!("[OK] ffmpeg: found");

    let compiled = compiled_encoders();
    println!("[OK] Compiled video encoders: {}", compiled.len());
    for candidate in HARDWARE_CANDIDATES {
        for codec in [VideoCodec::H264, VideoCodec::H265] {
            let name = candidate.encoder_name(codec);
            if compiled.iter().any(|c| c == name) {
                println!("     {name} ({})", candidate.label);
            }
        }
    }

    match detect_encoder(VideoCodec::H264, true) {
        Ok(profile) => {
            println!(
                "[OK] Selected encoder: {} ({})",
                profile.label,
                if profile.hardware { "hardware" } else { "software" }
            );
        }
        Err(e) => println!("[FAIL] Encoder probe: {e}"),
    }

    println!();
    println!("Hudburn is ready.");
    Ok(())
}
