// Copyright 2025 The dmatex Authors
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

use std::env;

fn main() -> Result<(), pkg_config::Error> {
    // Skip probing dependencies when generating documents.
    if env::var("CARGO_DOC").is_ok() {
        return Ok(());
    }

    if env::var_os("CARGO_FEATURE_MINIGBM").is_some() {
        pkg_config::Config::new().probe("gbm")?;
    }

    if env::var_os("CARGO_FEATURE_EGL").is_some() {
        pkg_config::Config::new().probe("egl")?;
        pkg_config::Config::new().probe("glesv2")?;
    }

    Ok(())
}
