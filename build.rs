//! Build script for the ZIA provider
//!
//! Embeds build-time information (git commit, dirty status, build timestamp)
//! reported by `terraform-provider-zia version`.

fn main() {
    shadow_rs::ShadowBuilder::builder()
        .build()
        .expect("Failed to generate build info");
}
