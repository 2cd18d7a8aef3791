use ndarray::{Array1, Array2, Array4, ArrayView4, Axis};

use crate::ml::{
    classifier::{GuidedBackward, check_logits_shape},
    error::MlResult,
    types::Label,
};

/// Narrows a two-class classifier to its fake-class logit, the scalar
/// target for attribution.
pub struct FakeLogitAdapter<'a> {
    classifier: &'a dyn GuidedBackward,
    fake_index: usize,
}

impl<'a> FakeLogitAdapter<'a> {
    pub fn new(classifier: &'a dyn GuidedBackward) -> Self {
        Self {
            classifier,
            fake_index: Label::Fake.index(),
        }
    }

    /// Fake-class logit per input row.
    pub fn forward(&self, batch: ArrayView4<'_, f32>) -> MlResult<Array1<f32>> {
        let output = self.classifier.forward(batch)?;
        check_logits_shape(&output.logits, batch.len_of(Axis(0)))?;
        Ok(output.logits.column(self.fake_index).to_owned())
    }

    /// Guided gradient of the fake logit with respect to `input`.
    pub fn input_gradient(&self, input: ArrayView4<'_, f32>) -> MlResult<Array4<f32>> {
        let rows = input.len_of(Axis(0));
        let output = self.classifier.forward(input)?;
        check_logits_shape(&output.logits, rows)?;

        let mut seed = Array2::<f32>::zeros(output.logits.raw_dim());
        seed.column_mut(self.fake_index).fill(1.0);
        self.classifier.guided_backward(input, seed.view())
    }
}

#[cfg(test)]
mod tests {
    use ndarray::{Array2, Array4, ArrayView2, ArrayView4, Axis};

    use super::FakeLogitAdapter;
    use crate::ml::{
        classifier::{Classifier, ClassifierOutput, GuidedBackward},
        error::{MlError, MlResult},
    };

    /// Logits `[-sum, sum]` of each sample; gradient echoes the seed.
    struct SumModel {
        classes: usize,
    }

    impl Classifier for SumModel {
        fn forward(&self, batch: ArrayView4<'_, f32>) -> MlResult<ClassifierOutput> {
            let rows = batch.len_of(Axis(0));
            let mut logits = Array2::zeros((rows, self.classes));
            for (row, sample) in batch.outer_iter().enumerate() {
                let total = sample.sum();
                logits[[row, 0]] = -total;
                logits[[row, 1]] = total;
            }
            Ok(ClassifierOutput {
                logits,
                reconstruction: None,
            })
        }
    }

    impl GuidedBackward for SumModel {
        fn guided_backward(
            &self,
            input: ArrayView4<'_, f32>,
            output_grad: ArrayView2<'_, f32>,
        ) -> MlResult<Array4<f32>> {
            let mut grad = Array4::zeros(input.raw_dim());
            for (row, mut sample) in grad.outer_iter_mut().enumerate() {
                sample.fill(output_grad[[row, 1]] - output_grad[[row, 0]]);
            }
            Ok(grad)
        }
    }

    #[test]
    fn forward_exposes_only_the_fake_column() {
        let model = SumModel { classes: 2 };
        let adapter = FakeLogitAdapter::new(&model);
        let batch = Array4::from_elem((2, 1, 2, 2), 0.5f32);

        let fake = adapter.forward(batch.view()).unwrap();

        assert_eq!(fake.to_vec(), vec![2.0, 2.0]);
    }

    #[test]
    fn gradient_is_seeded_at_the_fake_logit() {
        let model = SumModel { classes: 2 };
        let adapter = FakeLogitAdapter::new(&model);
        let input = Array4::zeros((1, 3, 2, 2));

        let grad = adapter.input_gradient(input.view()).unwrap();

        assert!(grad.iter().all(|g| (*g - 1.0).abs() < f32::EPSILON));
    }

    #[test]
    fn unexpected_output_shape_is_fatal() {
        let model = SumModel { classes: 3 };
        let adapter = FakeLogitAdapter::new(&model);
        let input = Array4::zeros((1, 1, 1, 1));

        assert!(matches!(
            adapter.input_gradient(input.view()),
            Err(MlError::ClassifierShape { .. })
        ));
    }
}
