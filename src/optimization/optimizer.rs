use crate::error::Result;

/// Defines the strategy for updating model parameters based on calculated gradients.
pub trait Optimizer {
    /// Updates the provided slice of parameters using the accumulated gradients.
    ///
    /// # Arguments
    /// * `params` - The parameters that are going to be modified.
    /// * `grad` - The gradient used for taking the step.
    ///
    /// # Returns
    /// An error if the lengths of `params` and `grad` disagree with the
    /// optimizer's state.
    fn update_params(&mut self, params: &mut [f32], grad: &[f32]) -> Result<()>;
}
