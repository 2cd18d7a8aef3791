//! A small differentiable feed-forward classifier (average pooling, dense
//! and ReLU layers) whose weights are loaded from JSON.

use std::path::Path;

use ndarray::{
    Array1, Array2, Array3, Array4, ArrayD, ArrayView2, ArrayView4, Axis, Ix3, ShapeError, Zip,
    s,
};
use serde::{Deserialize, Serialize};

use crate::ml::{
    classifier::{Classifier, ClassifierOutput, GuidedBackward},
    error::{MlError, MlResult},
    preprocess::quantize_half,
};

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum LayerSpec {
    AvgPool {
        kernel: usize,
    },
    Dense {
        inputs: usize,
        outputs: usize,
        /// Row-major `outputs x inputs`.
        weights: Vec<f32>,
        bias: Vec<f32>,
    },
    Relu,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct NetworkSpec {
    /// `[channels, height, width]` of one input sample.
    pub input_shape: [usize; 3],
    pub layers: Vec<LayerSpec>,
}

#[derive(Clone, Debug)]
enum Layer {
    AvgPool { kernel: usize },
    Dense { weights: Array2<f32>, bias: Array1<f32> },
    Relu,
}

#[derive(Clone, Debug)]
pub struct SequentialClassifier {
    input_shape: [usize; 3],
    layers: Vec<Layer>,
}

impl SequentialClassifier {
    pub fn from_spec(spec: NetworkSpec) -> MlResult<Self> {
        let mut shape = spec.input_shape.to_vec();
        if shape.iter().any(|d| *d == 0) {
            return Err(MlError::InvalidRequest(format!(
                "input shape {shape:?} has a zero dimension"
            )));
        }

        let mut layers = Vec::with_capacity(spec.layers.len());
        for (index, layer) in spec.layers.into_iter().enumerate() {
            let layer = match layer {
                LayerSpec::AvgPool { kernel } => {
                    if shape.len() != 3 || kernel == 0 || shape[1] < kernel || shape[2] < kernel {
                        return Err(MlError::InvalidRequest(format!(
                            "layer {index}: cannot pool shape {shape:?} with kernel {kernel}"
                        )));
                    }
                    shape = vec![shape[0], shape[1] / kernel, shape[2] / kernel];
                    Layer::AvgPool { kernel }
                }
                LayerSpec::Dense {
                    inputs,
                    outputs,
                    weights,
                    bias,
                } => {
                    let flat: usize = shape.iter().product();
                    if flat != inputs {
                        return Err(MlError::InvalidRequest(format!(
                            "layer {index}: dense layer expects {inputs} inputs, previous layer yields {flat}"
                        )));
                    }
                    if bias.len() != outputs {
                        return Err(MlError::InvalidRequest(format!(
                            "layer {index}: bias has {} values, expected {outputs}",
                            bias.len()
                        )));
                    }
                    let weights = Array2::from_shape_vec((outputs, inputs), weights)
                        .map_err(|e| {
                            MlError::InvalidRequest(format!("layer {index}: invalid weights: {e}"))
                        })?;
                    shape = vec![outputs];
                    Layer::Dense {
                        weights,
                        bias: Array1::from(bias),
                    }
                }
                LayerSpec::Relu => Layer::Relu,
            };
            layers.push(layer);
        }

        Ok(Self {
            input_shape: spec.input_shape,
            layers,
        })
    }

    pub fn load(path: impl AsRef<Path>) -> MlResult<Self> {
        let bytes = std::fs::read(path.as_ref())?;
        let spec: NetworkSpec = serde_json::from_slice(&bytes)?;
        Self::from_spec(spec)
    }

    /// Rounds all weights through half precision.
    pub fn into_half(mut self) -> Self {
        for layer in &mut self.layers {
            if let Layer::Dense { weights, bias } = layer {
                quantize_half(weights);
                quantize_half(bias);
            }
        }
        self
    }

    fn check_sample_shape(&self, batch: &ArrayView4<'_, f32>) -> MlResult<()> {
        let shape = batch.shape();
        if shape[1..] != self.input_shape[..] {
            return Err(MlError::InvalidRequest(format!(
                "classifier expects samples of shape {:?}, got {:?}",
                self.input_shape,
                &shape[1..]
            )));
        }
        Ok(())
    }

    /// Runs one sample, returning the input of every layer and the output.
    fn forward_sample(&self, sample: Array3<f32>) -> MlResult<(Vec<ArrayD<f32>>, Array1<f32>)> {
        let mut inputs = Vec::with_capacity(self.layers.len());
        let mut current = sample.into_dyn();
        for layer in &self.layers {
            let next = layer.forward(&current)?;
            inputs.push(current);
            current = next;
        }
        let output = Array1::from_iter(current.iter().copied());
        Ok((inputs, output))
    }
}

impl Layer {
    fn forward(&self, input: &ArrayD<f32>) -> MlResult<ArrayD<f32>> {
        match self {
            Layer::AvgPool { kernel } => {
                let input = input.view().into_dimensionality::<Ix3>().map_err(shape_error)?;
                let (channels, height, width) = input.dim();
                let (out_h, out_w) = (height / kernel, width / kernel);
                let area = (kernel * kernel) as f32;
                let mut output = Array3::<f32>::zeros((channels, out_h, out_w));
                for ((c, y, x), value) in output.indexed_iter_mut() {
                    let window = input.slice(s![
                        c,
                        y * kernel..(y + 1) * kernel,
                        x * kernel..(x + 1) * kernel
                    ]);
                    *value = window.sum() / area;
                }
                Ok(output.into_dyn())
            }
            Layer::Dense { weights, bias } => {
                let flat = Array1::from_iter(input.iter().copied());
                Ok((weights.dot(&flat) + bias).into_dyn())
            }
            Layer::Relu => Ok(input.mapv(|v| v.max(0.0))),
        }
    }

    fn guided_backward(
        &self,
        input: &ArrayD<f32>,
        grad_output: ArrayD<f32>,
    ) -> MlResult<ArrayD<f32>> {
        match self {
            Layer::AvgPool { kernel } => {
                let grad_output = grad_output
                    .into_dimensionality::<Ix3>()
                    .map_err(shape_error)?;
                let area = (kernel * kernel) as f32;
                let mut grad_input = ArrayD::<f32>::zeros(input.raw_dim());
                let mut view = grad_input
                    .view_mut()
                    .into_dimensionality::<Ix3>()
                    .map_err(shape_error)?;
                for ((c, y, x), grad) in grad_output.indexed_iter() {
                    view.slice_mut(s![
                        c,
                        y * kernel..(y + 1) * kernel,
                        x * kernel..(x + 1) * kernel
                    ])
                    .fill(grad / area);
                }
                Ok(grad_input)
            }
            Layer::Dense { weights, .. } => {
                let grad_output = Array1::from_iter(grad_output.iter().copied());
                let grad_flat = weights.t().dot(&grad_output);
                ArrayD::from_shape_vec(input.raw_dim(), grad_flat.to_vec()).map_err(shape_error)
            }
            Layer::Relu => {
                let mut grad_input = grad_output;
                Zip::from(&mut grad_input).and(input).for_each(|grad, x| {
                    if *x <= 0.0 || *grad <= 0.0 {
                        *grad = 0.0;
                    }
                });
                Ok(grad_input)
            }
        }
    }
}

impl Classifier for SequentialClassifier {
    fn forward(&self, batch: ArrayView4<'_, f32>) -> MlResult<ClassifierOutput> {
        self.check_sample_shape(&batch)?;
        let mut rows = Vec::with_capacity(batch.len_of(Axis(0)));
        for sample in batch.outer_iter() {
            let (_, output) = self.forward_sample(sample.to_owned())?;
            rows.push(output);
        }

        let width = rows.first().map(|r| r.len()).unwrap_or(0);
        let mut logits = Array2::<f32>::zeros((rows.len(), width));
        for (index, row) in rows.iter().enumerate() {
            if row.len() != width {
                return Err(MlError::InvalidRequest(
                    "classifier produced ragged outputs".to_string(),
                ));
            }
            logits.row_mut(index).assign(row);
        }

        Ok(ClassifierOutput {
            logits,
            reconstruction: None,
        })
    }
}

impl GuidedBackward for SequentialClassifier {
    fn guided_backward(
        &self,
        input: ArrayView4<'_, f32>,
        output_grad: ArrayView2<'_, f32>,
    ) -> MlResult<Array4<f32>> {
        self.check_sample_shape(&input)?;
        if output_grad.nrows() != input.len_of(Axis(0)) {
            return Err(MlError::Attribution(format!(
                "output gradient has {} rows for a batch of {}",
                output_grad.nrows(),
                input.len_of(Axis(0))
            )));
        }

        let mut grad_input = Array4::<f32>::zeros(input.raw_dim());
        for (index, sample) in input.outer_iter().enumerate() {
            let (layer_inputs, output) = self.forward_sample(sample.to_owned())?;
            let seed = output_grad.row(index);
            if seed.len() != output.len() {
                return Err(MlError::Attribution(format!(
                    "output gradient has {} columns, network yields {}",
                    seed.len(),
                    output.len()
                )));
            }

            let mut grad = seed.to_owned().into_dyn();
            for (layer, layer_input) in self.layers.iter().zip(&layer_inputs).rev() {
                grad = layer.guided_backward(layer_input, grad)?;
            }
            let grad = grad.into_dimensionality::<Ix3>().map_err(shape_error)?;
            grad_input.index_axis_mut(Axis(0), index).assign(&grad);
        }
        Ok(grad_input)
    }
}

fn shape_error(error: ShapeError) -> MlError {
    MlError::Attribution(format!("unexpected tensor shape: {error}"))
}

#[cfg(test)]
mod tests {
    use ndarray::{Array4, array};

    use super::{LayerSpec, NetworkSpec, SequentialClassifier};
    use crate::ml::classifier::{Classifier, GuidedBackward};

    /// 1x2x2 input -> dense(4 -> 2) -> relu -> dense(2 -> 2).
    fn small_network() -> SequentialClassifier {
        SequentialClassifier::from_spec(NetworkSpec {
            input_shape: [1, 2, 2],
            layers: vec![
                LayerSpec::Dense {
                    inputs: 4,
                    outputs: 2,
                    weights: vec![1.0, -1.0, 0.0, 0.0, 0.0, 0.0, 1.0, 1.0],
                    bias: vec![0.0, 0.0],
                },
                LayerSpec::Relu,
                LayerSpec::Dense {
                    inputs: 2,
                    outputs: 2,
                    weights: vec![0.0, 0.0, 2.0, -3.0],
                    bias: vec![0.0, 1.0],
                },
            ],
        })
        .expect("network should build")
    }

    #[test]
    fn forward_applies_layers_in_order() {
        let network = small_network();
        let input = Array4::from_shape_vec((1, 1, 2, 2), vec![3.0, 1.0, 2.0, 2.0]).unwrap();

        let output = network.forward(input.view()).unwrap();

        // hidden = relu([3 - 1, 2 + 2]) = [2, 4]; fake = 2*2 - 3*4 + 1
        assert_eq!(output.logits, array![[0.0, -7.0]]);
        assert!(output.reconstruction.is_none());
    }

    #[test]
    fn guided_backward_masks_negative_gradients_at_relu() {
        let network = small_network();
        let input = Array4::from_shape_vec((1, 1, 2, 2), vec![3.0, 1.0, 2.0, 2.0]).unwrap();
        let seed = array![[0.0f32, 1.0]];

        let grad = network.guided_backward(input.view(), seed.view()).unwrap();

        // Gradient into hidden is [2, -3]; the -3 is dropped by the guided rule.
        assert_eq!(
            grad.iter().copied().collect::<Vec<_>>(),
            vec![2.0, -2.0, 0.0, 0.0]
        );
    }

    #[test]
    fn inactive_units_block_gradient() {
        let network = small_network();
        let input = Array4::from_shape_vec((1, 1, 2, 2), vec![0.0, 5.0, 1.0, 1.0]).unwrap();
        let seed = array![[0.0f32, 1.0]];

        let grad = network.guided_backward(input.view(), seed.view()).unwrap();

        assert!(grad.iter().all(|g| *g == 0.0));
    }

    #[test]
    fn avg_pool_spreads_gradient_evenly() {
        let network = SequentialClassifier::from_spec(NetworkSpec {
            input_shape: [1, 4, 4],
            layers: vec![
                LayerSpec::AvgPool { kernel: 2 },
                LayerSpec::Dense {
                    inputs: 4,
                    outputs: 2,
                    weights: vec![0.0, 0.0, 0.0, 0.0, 4.0, 0.0, 0.0, 0.0],
                    bias: vec![0.0, 0.0],
                },
            ],
        })
        .unwrap();
        let input = Array4::from_elem((1, 1, 4, 4), 1.0f32);
        let seed = array![[0.0f32, 1.0]];

        let output = network.forward(input.view()).unwrap();
        let grad = network.guided_backward(input.view(), seed.view()).unwrap();

        assert_eq!(output.logits[[0, 1]], 4.0);
        assert_eq!(grad[[0, 0, 0, 0]], 1.0);
        assert_eq!(grad[[0, 0, 1, 1]], 1.0);
        assert_eq!(grad[[0, 0, 2, 2]], 0.0);
    }

    #[test]
    fn mismatched_dense_inputs_are_rejected() {
        let result = SequentialClassifier::from_spec(NetworkSpec {
            input_shape: [3, 4, 4],
            layers: vec![LayerSpec::Dense {
                inputs: 10,
                outputs: 2,
                weights: vec![0.0; 20],
                bias: vec![0.0; 2],
            }],
        });
        assert!(result.is_err());
    }

    #[test]
    fn wrong_sample_shape_is_rejected() {
        let network = small_network();
        let input = Array4::zeros((1, 3, 2, 2));
        assert!(network.forward(input.view()).is_err());
    }

    #[test]
    fn spec_round_trips_through_json_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("weights.json");
        std::fs::write(
            &path,
            r#"{"input_shape":[1,2,2],"layers":[{"type":"avg_pool","kernel":2},{"type":"relu"},{"type":"dense","inputs":1,"outputs":2,"weights":[1.0,-1.0],"bias":[0.0,0.5]}]}"#,
        )
        .unwrap();

        let network = SequentialClassifier::load(&path).expect("weights should load");
        let input = Array4::from_elem((2, 1, 2, 2), 2.0f32);
        let output = network.forward(input.view()).unwrap();

        assert_eq!(output.logits, array![[2.0, -1.5], [2.0, -1.5]]);
    }
}
