//! Binary real/fake classifier seam and video-level aggregation.

pub mod adapter;
pub mod sequential;

use ndarray::{Array2, Array4, ArrayView2, ArrayView4, Axis};

use crate::ml::{
    error::{MlError, MlResult},
    types::{Label, Prediction},
};

pub const NUM_CLASSES: usize = 2;

/// Result of one classifier forward pass.
#[derive(Clone, Debug)]
pub struct ClassifierOutput {
    /// `N x 2` logits, column 0 real, column 1 fake.
    pub logits: Array2<f32>,
    /// Autoencoder reconstruction of the input, for models that produce one.
    pub reconstruction: Option<Array4<f32>>,
}

pub trait Classifier {
    fn forward(&self, batch: ArrayView4<'_, f32>) -> MlResult<ClassifierOutput>;
}

/// Backward pass used for guided backpropagation.
pub trait GuidedBackward: Classifier {
    /// Gradient of `sum(output_grad * logits)` with respect to `input`, where
    /// every rectifier passes gradient only where both its forward input and
    /// the incoming gradient are positive.
    fn guided_backward(
        &self,
        input: ArrayView4<'_, f32>,
        output_grad: ArrayView2<'_, f32>,
    ) -> MlResult<Array4<f32>>;
}

/// Fails with [`MlError::ClassifierShape`] unless `logits` is `rows x 2`.
pub fn check_logits_shape(logits: &Array2<f32>, rows: usize) -> MlResult<()> {
    if logits.nrows() != rows || logits.ncols() != NUM_CLASSES {
        return Err(MlError::ClassifierShape {
            expected_rows: rows,
            actual: logits.shape().to_vec(),
        });
    }
    Ok(())
}

/// Classifies a face batch and aggregates it into one verdict.
pub fn predict(classifier: &dyn Classifier, batch: ArrayView4<'_, f32>) -> MlResult<Prediction> {
    let output = classifier.forward(batch)?;
    check_logits_shape(&output.logits, batch.len_of(Axis(0)))?;
    Ok(aggregate_logits(output.logits.view()))
}

/// Sigmoid per logit, mean over faces, argmax over classes. The reported
/// probability is the mean probability of the winning class; ties go to
/// REAL.
pub fn aggregate_logits(logits: ArrayView2<'_, f32>) -> Prediction {
    let probabilities = logits.mapv(sigmoid);
    let Some(mean) = probabilities.mean_axis(Axis(0)) else {
        return Prediction::no_faces();
    };

    let mut best = 0usize;
    for (index, value) in mean.iter().enumerate() {
        if *value > mean[best] {
            best = index;
        }
    }

    Prediction {
        label: Label::from_index(best).unwrap_or(Label::Real),
        probability: mean[best],
    }
}

fn sigmoid(x: f32) -> f32 {
    1.0 / (1.0 + (-x).exp())
}
