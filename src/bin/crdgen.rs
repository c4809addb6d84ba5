// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0
use kube::CustomResourceExt;
use lightrun_operator::types::LightrunJavaAgent;

fn main() -> anyhow::Result<()> {
    print!("{}", serde_yaml::to_string(&LightrunJavaAgent::crd())?);
    Ok(())
}
