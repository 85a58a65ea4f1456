//! Build script: embeds the git revision and checks GPU toolkits.

use std::process::Command;

fn main() {
    if let Ok(output) = Command::new("git")
        .args(["rev-parse", "--short=7", "HEAD"])
        .output()
        && output.status.success()
    {
        let hash = String::from_utf8_lossy(&output.stdout).trim().to_string();
        println!("cargo:rustc-env=GIT_HASH={}", hash);
    }
    println!("cargo:rerun-if-changed=.git/HEAD");

    if cfg!(feature = "cuda") {
        require_tool("nvcc", "--version", "CUDA toolkit", "https://developer.nvidia.com/cuda-downloads");
    }
    if cfg!(feature = "vulkan") {
        require_tool("vulkaninfo", "--summary", "Vulkan SDK", "https://vulkan.lunarg.com/");
    }
}

fn require_tool(tool: &str, probe_arg: &str, name: &str, url: &str) {
    let found = Command::new(tool)
        .arg(probe_arg)
        .output()
        .is_ok_and(|out| out.status.success());
    if !found {
        panic!(
            "\n\n`{tool}` not found: {name} is not installed.\n\
             Install: {url}\n\
             Or build without the GPU feature: cargo build --release\n"
        );
    }
    println!("cargo::warning={} detected", name);
}
