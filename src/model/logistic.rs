//! Logistic regression on burn
//!
//! A single `Linear(d, 1)` layer with sigmoid output, trained full-batch
//! with SGD on binary cross-entropy. Parameters live in plain vectors
//! between calls so the classifier serializes as JSON.

use burn::backend::{Autodiff, NdArray};
use burn::module::Param;
use burn::nn::{Linear, LinearConfig};
use burn::optim::{GradientsParams, Optimizer, SgdConfig};
use burn::tensor::activation::sigmoid;
use burn::tensor::backend::Backend;
use burn::tensor::{ElementConversion, Tensor, TensorData};
use serde::{Deserialize, Serialize};

use super::classifier::Classifier;
use crate::{DotaError, Result};

type TrainBackend = Autodiff<NdArray<f32>>;
type InferBackend = NdArray<f32>;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogisticClassifier {
    columns: Vec<String>,
    weights: Vec<f32>,
    bias: f32,
    learning_rate: f64,
}

impl LogisticClassifier {
    /// Zero-initialized classifier
    pub fn new(columns: Vec<String>, learning_rate: f64) -> Self {
        let weights = vec![0.0; columns.len()];
        LogisticClassifier {
            columns,
            weights,
            bias: 0.0,
            learning_rate,
        }
    }

    pub fn weights(&self) -> &[f32] {
        &self.weights
    }

    pub fn bias(&self) -> f32 {
        self.bias
    }

    pub fn set_learning_rate(&mut self, learning_rate: f64) {
        self.learning_rate = learning_rate;
    }

    fn to_linear<B: Backend>(&self, device: &B::Device) -> Linear<B> {
        let d = self.weights.len();
        let mut linear = LinearConfig::new(d, 1).init::<B>(device);
        linear.weight = Param::from_tensor(Tensor::from_data(
            TensorData::new(self.weights.clone(), [d, 1]),
            device,
        ));
        linear.bias = Some(Param::from_tensor(Tensor::from_data(
            TensorData::new(vec![self.bias], [1]),
            device,
        )));
        linear
    }

    fn read_back<B: Backend>(&mut self, linear: &Linear<B>) -> Result<()> {
        self.weights = linear
            .weight
            .val()
            .into_data()
            .to_vec::<f32>()
            .map_err(|e| DotaError::Model(format!("{:?}", e)))?;
        if let Some(bias) = &linear.bias {
            let values = bias
                .val()
                .into_data()
                .to_vec::<f32>()
                .map_err(|e| DotaError::Model(format!("{:?}", e)))?;
            self.bias = values.first().copied().unwrap_or(0.0);
        }
        Ok(())
    }

    fn check_rows(&self, x: &[Vec<f32>]) -> Result<()> {
        let d = self.columns.len();
        match x.iter().position(|row| row.len() != d) {
            Some(i) => Err(DotaError::Model(format!(
                "Row {} has {} values, expected {}",
                i,
                x[i].len(),
                d
            ))),
            None => Ok(()),
        }
    }

    fn design_matrix<B: Backend>(x: &[Vec<f32>], d: usize, device: &B::Device) -> Tensor<B, 2> {
        let flat: Vec<f32> = x.iter().flatten().copied().collect();
        Tensor::from_data(TensorData::new(flat, [x.len(), d]), device)
    }
}

fn binary_cross_entropy<B: Backend>(probs: Tensor<B, 2>, targets: Tensor<B, 2>) -> Tensor<B, 1> {
    let eps = 1e-7;
    let p = probs.clamp(eps, 1.0 - eps);
    let loss = targets.clone().neg() * p.clone().log() - (targets.neg() + 1.0) * (p.neg() + 1.0).log();
    loss.mean()
}

impl Classifier for LogisticClassifier {
    fn columns(&self) -> &[String] {
        &self.columns
    }

    fn fit(&mut self, x: &[Vec<f32>], y: &[u8], epochs: usize) -> Result<()> {
        if x.is_empty() || x.len() != y.len() {
            return Err(DotaError::Model(format!(
                "Cannot fit on {} rows with {} labels",
                x.len(),
                y.len()
            )));
        }
        self.check_rows(x)?;

        let device = Default::default();
        let d = self.columns.len();
        let xs = Self::design_matrix::<TrainBackend>(x, d, &device);
        let targets: Vec<f32> = y.iter().map(|v| *v as f32).collect();
        let ys = Tensor::<TrainBackend, 2>::from_data(TensorData::new(targets, [y.len(), 1]), &device);

        let mut model = self.to_linear::<TrainBackend>(&device);
        let mut optimizer = SgdConfig::new().init::<TrainBackend, Linear<TrainBackend>>();

        for epoch in 0..epochs {
            let probs = sigmoid(model.forward(xs.clone()));
            let loss = binary_cross_entropy(probs, ys.clone());
            let loss_val: f32 = loss.clone().into_scalar().elem();

            let grads = GradientsParams::from_grads(loss.backward(), &model);
            model = optimizer.step(self.learning_rate, model, grads);

            if epoch % 100 == 0 || epoch + 1 == epochs {
                log::debug!("Epoch {}/{}: loss={:.4}", epoch + 1, epochs, loss_val);
            }
        }

        self.read_back(&model)
    }

    fn predict_proba(&self, x: &[Vec<f32>]) -> Result<Vec<[f32; 2]>> {
        if x.is_empty() {
            return Ok(Vec::new());
        }
        self.check_rows(x)?;

        let device = Default::default();
        let model = self.to_linear::<InferBackend>(&device);
        let xs = Self::design_matrix::<InferBackend>(x, self.columns.len(), &device);
        let probs = sigmoid(model.forward(xs))
            .into_data()
            .to_vec::<f32>()
            .map_err(|e| DotaError::Model(format!("{:?}", e)))?;

        Ok(probs.into_iter().map(|p| [1.0 - p, p]).collect())
    }
}
