use ndarray::{ArrayD, IxDyn, array};
use net_core::Layer;
use net_layers::{InnerProduct, InnerProductConfig, LAYER_KINDS, ReLU, Sigmoid, SoftMax, build_layer};
use serde_json::{Value, json};

fn every_layer() -> Vec<Box<dyn Layer>> {
    vec![
        Box::new(ReLU::default()),
        Box::new(Sigmoid::default()),
        Box::new(SoftMax::default()),
        Box::new(InnerProduct::new(InnerProductConfig::with_output_shape([2, 2])).unwrap()),
    ]
}

fn input() -> ArrayD<f32> {
    array![[0.5, -1.5, 2.0], [-0.25, 1.0, 0.0]].into_dyn()
}

fn set_up(layer: &mut dyn Layer, x: &ArrayD<f32>, top: &mut Vec<ArrayD<f32>>) {
    layer.setup(&[x.view()], top).unwrap();
}

fn run(layer: &mut dyn Layer, x: &ArrayD<f32>, top: &mut [ArrayD<f32>]) {
    layer.forward(&[x.view()], &mut [top[0].view_mut()]).unwrap();
}

#[test]
fn resetup_then_forward_is_idempotent() {
    let x = input();

    for mut layer in every_layer() {
        let mut top = vec![ArrayD::zeros(IxDyn(&[0]))];
        set_up(layer.as_mut(), &x, &mut top);
        let n = layer.params().num_elements();
        let v: Vec<f32> = (0..n).map(|i| (i as f32 * 0.37).sin()).collect();
        layer.set_flat_parameters(&v).unwrap();

        run(layer.as_mut(), &x, &mut top);
        let first = top[0].clone();

        set_up(layer.as_mut(), &x, &mut top);
        run(layer.as_mut(), &x, &mut top);

        assert_eq!(top[0].shape(), first.shape(), "{}", layer.kind());
        assert_eq!(top[0], first, "{}", layer.kind());
        assert_eq!(layer.flat_parameters().to_vec(), v, "{}", layer.kind());
    }
}

#[test]
fn flat_parameters_round_trip() {
    let x = input();

    for mut layer in every_layer() {
        let mut top = vec![ArrayD::zeros(IxDyn(&[0]))];
        set_up(layer.as_mut(), &x, &mut top);

        let v: Vec<f32> = (0..layer.params().num_elements()).map(|i| i as f32).collect();
        layer.set_flat_parameters(&v).unwrap();

        assert_eq!(layer.flat_parameters().to_vec(), v, "{}", layer.kind());
        assert_eq!(
            layer.flat_gradient().len(),
            layer.flat_parameters().len(),
            "{}",
            layer.kind()
        );
    }
}

#[test]
fn unknown_options_are_configuration_errors() {
    for kind in LAYER_KINDS {
        let err = build_layer(kind, json!({ "no_such_option": 1 })).err().unwrap();
        assert!(
            matches!(err, net_core::NetErr::UnknownOption { .. }),
            "{kind}: {err}"
        );
        assert!(build_layer(kind, Value::Null).is_ok());
    }
}
