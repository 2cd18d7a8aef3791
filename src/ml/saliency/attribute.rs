use ndarray::{Array2, Array3, ArrayView3, Axis};

use crate::ml::{
    classifier::{GuidedBackward, adapter::FakeLogitAdapter},
    error::{MlError, MlResult},
};

/// Guided-backpropagation attribution against the fake-class logit.
pub struct GuidedBackprop<'a> {
    adapter: FakeLogitAdapter<'a>,
}

impl<'a> GuidedBackprop<'a> {
    pub fn new(classifier: &'a dyn GuidedBackward) -> Self {
        Self {
            adapter: FakeLogitAdapter::new(classifier),
        }
    }

    /// Per-channel attribution for one `C x H x W` face. The face is copied
    /// into a fresh single-item batch so no state is shared between faces.
    pub fn attribute(&self, face: ArrayView3<'_, f32>) -> MlResult<Array3<f32>> {
        let input = face.to_owned().insert_axis(Axis(0));
        let gradient = self.adapter.input_gradient(input.view())?;
        if gradient.shape() != input.shape() {
            return Err(MlError::Attribution(format!(
                "attribution shape {:?} does not match input {:?}",
                gradient.shape(),
                input.shape()
            )));
        }
        Ok(gradient.index_axis_move(Axis(0), 0))
    }

    /// Attribution summed over channels, absolute value.
    pub fn saliency(&self, face: ArrayView3<'_, f32>) -> MlResult<Array2<f32>> {
        Ok(collapse_channels(&self.attribute(face)?))
    }
}

pub fn collapse_channels(attribution: &Array3<f32>) -> Array2<f32> {
    attribution.sum_axis(Axis(0)).mapv(f32::abs)
}
