//! Build script for cardboard_vr
//! Adds necessary linker flags for the Android NDK sensor library

fn main() {
    // Only for Android targets
    if std::env::var("CARGO_CFG_TARGET_OS").map_or(false, |os| os == "android") {
        // ASensorManager / ALooper live in libandroid
        println!("cargo:rustc-link-lib=android");
    }
}
