use gumdrop::Options;

#[derive(Options)]
pub struct AppOptions {
    /// Print this help message
    #[options()]
    help: bool,
    /// Path to the BIOS image. Omit to run with BIOS skipped.
    #[options(default = "")]
    pub bios: String,
    /// Path to the GBA ROM to run.
    #[options(required)]
    pub rom: String,
    /// Number of frames to step before checking the frame buffer.
    #[options(default = "60")]
    pub frames: u32,
    /// Expected blake2 hex digest of the frame buffer; mismatches exit non-zero.
    #[options(default = "")]
    pub digest: String,
    /// Optional path to dump the final frame buffer as a PNG.
    #[options(default = "")]
    pub png_out: String,
}
