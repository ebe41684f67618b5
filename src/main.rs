use std::{env, error::Error, fs};

use blobnet::NetworkSpec;
use log::info;
use ndarray::{ArrayD, IxDyn};

const DEFAULT_SPEC: &str = r#"{
    "entries": [
        {
            "name": "hidden",
            "kind": "inner_product",
            "options": {
                "output_shape": 4,
                "weight_filler": { "type": "uniform", "low": -0.5, "high": 0.5 },
                "seed": 7
            },
            "inputs": ["x"],
            "outputs": ["h"]
        },
        { "name": "squash", "kind": "sigmoid", "inputs": ["h"], "outputs": ["s"] },
        {
            "name": "logits",
            "kind": "inner_product",
            "options": {
                "output_shape": 3,
                "weight_filler": { "type": "normal", "mean": 0.0, "std_dev": 0.5 },
                "seed": 11
            },
            "inputs": ["s"],
            "outputs": ["z"]
        },
        { "name": "probs", "kind": "softmax", "inputs": ["z"], "outputs": ["y"] }
    ]
}"#;

fn main() -> Result<(), Box<dyn Error>> {
    env_logger::init();

    let spec = match env::args().nth(1) {
        Some(path) => fs::read_to_string(path)?,
        None => DEFAULT_SPEC.to_string(),
    };
    let spec: NetworkSpec = serde_json::from_str(&spec)?;

    let mut net = spec.build()?;
    let x = ArrayD::from_shape_vec(IxDyn(&[3]), vec![0.5f32, -1., 2.])?;
    net.setup([("x", x.view())])?;
    info!("parameters: {} value(s)", net.flat_parameters()?.len());

    net.forward([("x", x.view())])?;
    let last = net
        .entries()
        .last()
        .and_then(|entry| entry.outputs().first())
        .cloned()
        .unwrap_or_else(|| "x".to_string());
    let out = net.blob(&last)?.clone();
    info!("forward '{last}': {out}");

    net.push_state();
    let mut seed = ArrayD::<f32>::zeros(out.raw_dim());
    if let Some(first) = seed.iter_mut().next() {
        *first = 1.;
    }
    net.backward([(last.as_str(), seed.view())])?;
    info!("input diff: {}", net.diff("x")?);
    info!("flat gradient: {}", net.flat_gradient()?);

    net.forward([("x", (&x * 2.).view())])?;
    net.pop_state()?;
    info!("restored '{last}': {}", net.blob(&last)?);

    Ok(())
}
