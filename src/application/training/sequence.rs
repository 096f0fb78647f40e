//! Attention-augmented LSTM forecaster.
//!
//! A single LSTM layer runs over a sliding window of feature rows, a
//! temporal-attention head pools the hidden states into a context vector,
//! and a linear readout emits one value per horizon step. Training is
//! plain SGD with full backpropagation through time, minimizing
//!
//! ```text
//! loss = alpha * MSE + (1 - alpha) * directional term
//! ```
//!
//! where the directional term is the mean of `1 - tanh(k * dp) * sign(da)`
//! over consecutive steps, anchored at the last observed target so the
//! first forecast step also has a direction.

use super::forest::ForecastSet;
use super::search::ParamSet;
use crate::config::TrainingConfig;
use crate::domain::errors::PipelineError;
use ndarray::{s, Array1, Array2, Axis};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::Serialize;
use std::ops::Range;
use tracing::{debug, warn};

#[derive(Debug, Clone, Copy)]
pub struct SequenceHyperParams {
    pub window: usize,
    pub hidden: usize,
    pub epochs: usize,
    pub learning_rate: f64,
    pub loss_alpha: f64,
    pub direction_steepness: f64,
    pub seed: u64,
}

impl SequenceHyperParams {
    pub fn from_config(config: &TrainingConfig) -> Self {
        Self {
            window: config.window,
            hidden: config.hidden,
            epochs: config.epochs,
            learning_rate: config.learning_rate,
            loss_alpha: config.loss_alpha,
            direction_steepness: config.direction_steepness,
            seed: config.seed,
        }
    }

    /// Overlays searched values onto the config defaults.
    pub fn with_params(config: &TrainingConfig, params: &ParamSet) -> Self {
        let mut hp = Self::from_config(config);
        if let Some(&v) = params.get("hidden") {
            hp.hidden = v as usize;
        }
        if let Some(&v) = params.get("window") {
            hp.window = v as usize;
        }
        if let Some(&v) = params.get("learning_rate") {
            hp.learning_rate = v;
        }
        hp
    }
}

/// Gradient clipping bound on the global gradient norm.
const CLIP_NORM: f64 = 5.0;

/// Single-layer LSTM with temporal attention and a linear readout.
///
/// Gate pre-activations are stored stacked as one `4H` vector in the fixed
/// order input, forget, cell, output.
#[derive(Debug, Clone)]
struct AttentionLstm {
    w_x: Array2<f64>,   // 4H x D
    w_h: Array2<f64>,   // 4H x H
    b: Array1<f64>,     // 4H
    w_a: Array2<f64>,   // H x H
    b_a: Array1<f64>,   // H
    v_a: Array1<f64>,   // H
    w_out: Array2<f64>, // horizon x H
    b_out: Array1<f64>, // horizon
    hidden: usize,
}

/// Forward-pass intermediates needed by backpropagation.
struct Cache {
    xs: Vec<Array1<f64>>,
    gates: Vec<Array1<f64>>, // activated i,f,g,o stacked per step
    cells: Vec<Array1<f64>>,
    cell_tanh: Vec<Array1<f64>>,
    hs: Vec<Array1<f64>>,
    attn_u: Vec<Array1<f64>>, // tanh(W_a h_t + b_a)
    attn_w: Array1<f64>,      // softmax weights over steps
    context: Array1<f64>,
}

/// Parameter-shaped gradient accumulator.
struct Grads {
    w_x: Array2<f64>,
    w_h: Array2<f64>,
    b: Array1<f64>,
    w_a: Array2<f64>,
    b_a: Array1<f64>,
    v_a: Array1<f64>,
    w_out: Array2<f64>,
    b_out: Array1<f64>,
}

fn sigmoid(v: f64) -> f64 {
    1.0 / (1.0 + (-v).exp())
}

fn outer(a: &Array1<f64>, b: &Array1<f64>) -> Array2<f64> {
    let a2 = a.view().insert_axis(Axis(1));
    let b2 = b.view().insert_axis(Axis(0));
    a2.dot(&b2)
}

impl AttentionLstm {
    fn new(input_dim: usize, hidden: usize, horizon: usize, seed: u64) -> Self {
        let mut rng = StdRng::seed_from_u64(seed);
        let bound = 1.0 / (hidden as f64).sqrt();
        let mut init2 = |r: usize, c: usize| {
            Array2::from_shape_fn((r, c), |_| rng.random_range(-bound..bound))
        };
        let w_x = init2(4 * hidden, input_dim);
        let w_h = init2(4 * hidden, hidden);
        let w_a = init2(hidden, hidden);
        let w_out = init2(horizon, hidden);
        let mut rng = StdRng::seed_from_u64(seed.wrapping_add(1));
        let v_a = Array1::from_shape_fn(hidden, |_| rng.random_range(-bound..bound));

        let mut b = Array1::zeros(4 * hidden);
        // Forget-gate bias starts at 1 so early epochs retain state.
        b.slice_mut(s![hidden..2 * hidden]).fill(1.0);
        Self {
            w_x,
            w_h,
            b,
            w_a,
            b_a: Array1::zeros(hidden),
            v_a,
            w_out,
            b_out: Array1::zeros(horizon),
            hidden,
        }
    }

    /// Runs the window through the recurrence and attention pooling.
    fn forward(&self, x: &Array2<f64>) -> (Array1<f64>, Cache) {
        let h_dim = self.hidden;
        let steps = x.nrows();
        let mut h = Array1::zeros(h_dim);
        let mut c: Array1<f64> = Array1::zeros(h_dim);

        let mut cache = Cache {
            xs: Vec::with_capacity(steps),
            gates: Vec::with_capacity(steps),
            cells: Vec::with_capacity(steps),
            cell_tanh: Vec::with_capacity(steps),
            hs: Vec::with_capacity(steps),
            attn_u: Vec::with_capacity(steps),
            attn_w: Array1::zeros(steps),
            context: Array1::zeros(h_dim),
        };

        for t in 0..steps {
            let x_t = x.row(t).to_owned();
            let z = self.w_x.dot(&x_t) + self.w_h.dot(&h) + &self.b;
            let mut gates = Array1::zeros(4 * h_dim);
            for j in 0..h_dim {
                gates[j] = sigmoid(z[j]); // input
                gates[h_dim + j] = sigmoid(z[h_dim + j]); // forget
                gates[2 * h_dim + j] = z[2 * h_dim + j].tanh(); // cell
                gates[3 * h_dim + j] = sigmoid(z[3 * h_dim + j]); // output
            }
            let mut new_c = Array1::zeros(h_dim);
            for j in 0..h_dim {
                new_c[j] = gates[h_dim + j] * c[j] + gates[j] * gates[2 * h_dim + j];
            }
            let tanh_c = new_c.mapv(f64::tanh);
            let mut new_h = Array1::zeros(h_dim);
            for j in 0..h_dim {
                new_h[j] = gates[3 * h_dim + j] * tanh_c[j];
            }

            cache.xs.push(x_t);
            cache.gates.push(gates);
            cache.cells.push(new_c.clone());
            cache.cell_tanh.push(tanh_c);
            cache.hs.push(new_h.clone());
            c = new_c;
            h = new_h;
        }

        // Temporal attention over the hidden states.
        let mut scores = Array1::zeros(steps);
        for t in 0..steps {
            let u = (self.w_a.dot(&cache.hs[t]) + &self.b_a).mapv(f64::tanh);
            scores[t] = self.v_a.dot(&u);
            cache.attn_u.push(u);
        }
        let max_score = scores.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
        let exp = scores.mapv(|v| (v - max_score).exp());
        let weights = &exp / exp.sum();

        let mut context = Array1::zeros(h_dim);
        for t in 0..steps {
            context = context + cache.hs[t].mapv(|v| v * weights[t]);
        }
        cache.attn_w = weights;
        cache.context = context.clone();

        let pred = self.w_out.dot(&context) + &self.b_out;
        (pred, cache)
    }

    /// Backpropagates a gradient on the prediction through the attention
    /// head and the recurrence, accumulating into `grads`.
    fn backward(&self, cache: &Cache, d_pred: &Array1<f64>, grads: &mut Grads) {
        let h_dim = self.hidden;
        let steps = cache.hs.len();

        grads.w_out = &grads.w_out + &outer(d_pred, &cache.context);
        grads.b_out = &grads.b_out + d_pred;
        let d_context = self.w_out.t().dot(d_pred);

        // Attention backward: split the context gradient into the weighted
        // hidden-state path and the softmax-score path.
        let mut d_h_ext: Vec<Array1<f64>> = (0..steps).map(|_| Array1::zeros(h_dim)).collect();
        let d_alpha: Vec<f64> = (0..steps).map(|t| d_context.dot(&cache.hs[t])).collect();
        let weighted_sum: f64 = (0..steps).map(|t| cache.attn_w[t] * d_alpha[t]).sum();
        for t in 0..steps {
            d_h_ext[t] = d_context.mapv(|v| v * cache.attn_w[t]);
            let d_score = cache.attn_w[t] * (d_alpha[t] - weighted_sum);
            grads.v_a = &grads.v_a + &cache.attn_u[t].mapv(|v| v * d_score);
            let d_a = cache.attn_u[t].mapv(|u| 1.0 - u * u) * self.v_a.mapv(|v| v * d_score);
            grads.w_a = &grads.w_a + &outer(&d_a, &cache.hs[t]);
            grads.b_a = &grads.b_a + &d_a;
            d_h_ext[t] = &d_h_ext[t] + &self.w_a.t().dot(&d_a);
        }

        // BPTT through the LSTM recurrence.
        let mut d_h_next: Array1<f64> = Array1::zeros(h_dim);
        let mut d_c_next: Array1<f64> = Array1::zeros(h_dim);
        for t in (0..steps).rev() {
            let d_h = &d_h_ext[t] + &d_h_next;
            let gates = &cache.gates[t];
            let tanh_c = &cache.cell_tanh[t];
            let prev_c = if t == 0 {
                Array1::zeros(h_dim)
            } else {
                cache.cells[t - 1].clone()
            };

            let mut d_z = Array1::zeros(4 * h_dim);
            let mut d_c_prev = Array1::zeros(h_dim);
            for j in 0..h_dim {
                let (i, f, g, o) = (
                    gates[j],
                    gates[h_dim + j],
                    gates[2 * h_dim + j],
                    gates[3 * h_dim + j],
                );
                let d_o = d_h[j] * tanh_c[j];
                let d_c = d_h[j] * o * (1.0 - tanh_c[j] * tanh_c[j]) + d_c_next[j];
                let d_i = d_c * g;
                let d_g = d_c * i;
                let d_f = d_c * prev_c[j];
                d_c_prev[j] = d_c * f;

                d_z[j] = d_i * i * (1.0 - i);
                d_z[h_dim + j] = d_f * f * (1.0 - f);
                d_z[2 * h_dim + j] = d_g * (1.0 - g * g);
                d_z[3 * h_dim + j] = d_o * o * (1.0 - o);
            }

            let prev_h = if t == 0 {
                Array1::zeros(h_dim)
            } else {
                cache.hs[t - 1].clone()
            };
            grads.w_x = &grads.w_x + &outer(&d_z, &cache.xs[t]);
            grads.w_h = &grads.w_h + &outer(&d_z, &prev_h);
            grads.b = &grads.b + &d_z;
            d_h_next = self.w_h.t().dot(&d_z);
            d_c_next = d_c_prev;
        }
    }

    fn zero_grads(&self) -> Grads {
        Grads {
            w_x: Array2::zeros(self.w_x.raw_dim()),
            w_h: Array2::zeros(self.w_h.raw_dim()),
            b: Array1::zeros(self.b.raw_dim()),
            w_a: Array2::zeros(self.w_a.raw_dim()),
            b_a: Array1::zeros(self.b_a.raw_dim()),
            v_a: Array1::zeros(self.v_a.raw_dim()),
            w_out: Array2::zeros(self.w_out.raw_dim()),
            b_out: Array1::zeros(self.b_out.raw_dim()),
        }
    }

    fn apply(&mut self, grads: &Grads, lr: f64) {
        let sq = grads.w_x.iter().map(|v| v * v).sum::<f64>()
            + grads.w_h.iter().map(|v| v * v).sum::<f64>()
            + grads.b.iter().map(|v| v * v).sum::<f64>()
            + grads.w_a.iter().map(|v| v * v).sum::<f64>()
            + grads.b_a.iter().map(|v| v * v).sum::<f64>()
            + grads.v_a.iter().map(|v| v * v).sum::<f64>()
            + grads.w_out.iter().map(|v| v * v).sum::<f64>()
            + grads.b_out.iter().map(|v| v * v).sum::<f64>();
        let norm = sq.sqrt();
        let scale = if norm > CLIP_NORM {
            lr * CLIP_NORM / norm
        } else {
            lr
        };

        self.w_x = &self.w_x - &grads.w_x.mapv(|v| v * scale);
        self.w_h = &self.w_h - &grads.w_h.mapv(|v| v * scale);
        self.b = &self.b - &grads.b.mapv(|v| v * scale);
        self.w_a = &self.w_a - &grads.w_a.mapv(|v| v * scale);
        self.b_a = &self.b_a - &grads.b_a.mapv(|v| v * scale);
        self.v_a = &self.v_a - &grads.v_a.mapv(|v| v * scale);
        self.w_out = &self.w_out - &grads.w_out.mapv(|v| v * scale);
        self.b_out = &self.b_out - &grads.b_out.mapv(|v| v * scale);
    }
}

/// Combined loss and its gradient with respect to the prediction vector.
///
/// `anchor` is the last observed target before the forecast; it gives the
/// first step a previous value to difference against and never receives a
/// gradient itself.
pub(crate) fn loss_and_grad(
    pred: &Array1<f64>,
    target: &Array1<f64>,
    anchor: f64,
    alpha: f64,
    steepness: f64,
) -> (f64, Array1<f64>) {
    let h = pred.len();
    let hf = h as f64;

    let mut mse = 0.0;
    let mut grad = Array1::zeros(h);
    for k in 0..h {
        let err = pred[k] - target[k];
        mse += err * err / hf;
        grad[k] = alpha * 2.0 * err / hf;
    }

    let mut dir = 0.0;
    for k in 0..h {
        let prev_p = if k == 0 { anchor } else { pred[k - 1] };
        let prev_a = if k == 0 { anchor } else { target[k - 1] };
        let dp = pred[k] - prev_p;
        let sign = if target[k] - prev_a > 0.0 { 1.0 } else { -1.0 };
        let t = (steepness * dp).tanh();
        dir += (1.0 - t * sign) / hf;

        // d/d(dp) of -tanh(k*dp)*sign, spread to the two prediction
        // entries that form dp.
        let d_dp = -(1.0 - alpha) * steepness * sign * (1.0 - t * t) / hf;
        grad[k] += d_dp;
        if k > 0 {
            grad[k - 1] -= d_dp;
        }
    }

    (alpha * mse + (1.0 - alpha) * dir, grad)
}

/// Sliding windows over a partition: inputs end at `t`, labels cover
/// `t..t + horizon`, the anchor is the target at `t - 1`.
struct WindowSet {
    inputs: Vec<Array2<f64>>,
    targets: Vec<Array1<f64>>,
    anchors: Vec<f64>,
    /// First label index of each window, for aligning forecast series.
    label_starts: Vec<usize>,
}

fn build_windows(
    rows: &[Vec<f64>],
    target: &[f64],
    part: &Range<usize>,
    window: usize,
    horizon: usize,
) -> WindowSet {
    let n = rows.len();
    let n_features = rows.first().map(Vec::len).unwrap_or(0);
    let mut set = WindowSet {
        inputs: Vec::new(),
        targets: Vec::new(),
        anchors: Vec::new(),
        label_starts: Vec::new(),
    };
    for t in window.max(part.start)..=n.saturating_sub(horizon) {
        if t + horizon > part.end {
            break;
        }
        let mut input = Array2::zeros((window, n_features));
        for (w, i) in (t - window..t).enumerate() {
            for j in 0..n_features {
                input[[w, j]] = rows[i][j];
            }
        }
        set.inputs.push(input);
        set.targets
            .push(Array1::from_iter(target[t..t + horizon].iter().cloned()));
        set.anchors.push(target[t - 1]);
        set.label_starts.push(t);
    }
    set
}

/// Column-wise z-score statistics fitted on the training partition only.
#[derive(Debug, Clone, Serialize)]
struct SequenceScaler {
    feature_means: Vec<f64>,
    feature_stds: Vec<f64>,
    target_mean: f64,
    target_std: f64,
}

impl SequenceScaler {
    fn fit(rows: &[Vec<f64>], target: &[f64], train: &Range<usize>) -> Self {
        let n = train.len() as f64;
        let n_features = rows.first().map(Vec::len).unwrap_or(0);
        let mut feature_means = vec![0.0; n_features];
        let mut feature_stds = vec![0.0; n_features];
        for j in 0..n_features {
            let mean = train.clone().map(|i| rows[i][j]).sum::<f64>() / n;
            let var = train.clone().map(|i| (rows[i][j] - mean).powi(2)).sum::<f64>() / n;
            feature_means[j] = mean;
            feature_stds[j] = if var > 0.0 { var.sqrt() } else { 1.0 };
        }
        let target_mean = train.clone().map(|i| target[i]).sum::<f64>() / n;
        let target_var =
            train.clone().map(|i| (target[i] - target_mean).powi(2)).sum::<f64>() / n;
        Self {
            feature_means,
            feature_stds,
            target_mean,
            target_std: if target_var > 0.0 {
                target_var.sqrt()
            } else {
                1.0
            },
        }
    }

    fn scale_rows(&self, rows: &[Vec<f64>]) -> Vec<Vec<f64>> {
        rows.iter()
            .map(|r| {
                r.iter()
                    .zip(self.feature_means.iter().zip(&self.feature_stds))
                    .map(|(v, (m, s))| (v - m) / s)
                    .collect()
            })
            .collect()
    }

    fn scale_target(&self, target: &[f64]) -> Vec<f64> {
        target
            .iter()
            .map(|v| (v - self.target_mean) / self.target_std)
            .collect()
    }

    fn unscale(&self, v: f64) -> f64 {
        v * self.target_std + self.target_mean
    }
}

#[derive(Serialize)]
struct ArrayBlob {
    shape: Vec<usize>,
    data: Vec<f64>,
}

fn blob1(a: &Array1<f64>) -> ArrayBlob {
    ArrayBlob {
        shape: vec![a.len()],
        data: a.to_vec(),
    }
}

fn blob2(a: &Array2<f64>) -> ArrayBlob {
    ArrayBlob {
        shape: a.shape().to_vec(),
        data: a.iter().cloned().collect(),
    }
}

/// A trained sequence model with its scaling statistics.
pub struct FittedSequenceModel {
    model: AttentionLstm,
    scaler: SequenceScaler,
    window: usize,
    horizon: usize,
    pub epoch_losses: Vec<f64>,
    pub converged: bool,
}

impl FittedSequenceModel {
    /// Fits on training-partition windows only, in time order.
    pub fn fit(
        rows: &[Vec<f64>],
        target: &[f64],
        train: &Range<usize>,
        horizon: usize,
        hp: SequenceHyperParams,
    ) -> Result<Self, PipelineError> {
        if horizon == 0 {
            return Err(PipelineError::fit("forecast horizon must be at least 1"));
        }
        let n_features = rows.first().map(Vec::len).unwrap_or(0);
        if n_features == 0 {
            return Err(PipelineError::fit("sequence model needs at least one feature"));
        }

        let scaler = SequenceScaler::fit(rows, target, train);
        let scaled_rows = scaler.scale_rows(rows);
        let scaled_target = scaler.scale_target(target);
        let windows = build_windows(&scaled_rows, &scaled_target, train, hp.window, horizon);
        if windows.inputs.len() < 10 {
            return Err(PipelineError::InsufficientData {
                context: format!("sequence training windows (window = {})", hp.window),
                rows: windows.inputs.len(),
                required: 10,
            });
        }

        let mut model = AttentionLstm::new(n_features, hp.hidden, horizon, hp.seed);
        let mut epoch_losses = Vec::with_capacity(hp.epochs);
        let mut converged = true;

        for epoch in 0..hp.epochs {
            let checkpoint = model.clone();
            let mut total = 0.0;
            for w in 0..windows.inputs.len() {
                let (pred, cache) = model.forward(&windows.inputs[w]);
                let (loss, d_pred) = loss_and_grad(
                    &pred,
                    &windows.targets[w],
                    windows.anchors[w],
                    hp.loss_alpha,
                    hp.direction_steepness,
                );
                total += loss;
                let mut grads = model.zero_grads();
                model.backward(&cache, &d_pred, &mut grads);
                model.apply(&grads, hp.learning_rate);
            }
            let mean_loss = total / windows.inputs.len() as f64;
            if !mean_loss.is_finite() {
                warn!(epoch, "sequence training diverged; keeping previous weights");
                model = checkpoint;
                converged = false;
                break;
            }
            debug!(epoch, loss = mean_loss, "sequence epoch");
            epoch_losses.push(mean_loss);
        }

        Ok(Self {
            model,
            scaler,
            window: hp.window,
            horizon,
            epoch_losses,
            converged,
        })
    }

    /// Forecasts every window whose labels fall in `part`.
    pub fn forecast(
        &self,
        rows: &[Vec<f64>],
        target: &[f64],
        part: &Range<usize>,
    ) -> Result<ForecastSet, PipelineError> {
        let scaled_rows = self.scaler.scale_rows(rows);
        let scaled_target = self.scaler.scale_target(target);
        let windows = build_windows(&scaled_rows, &scaled_target, part, self.window, self.horizon);
        if windows.inputs.is_empty() {
            return Err(PipelineError::InsufficientData {
                context: "sequence evaluation windows".to_string(),
                rows: part.len(),
                required: self.horizon + 1,
            });
        }

        let mut set = ForecastSet {
            pooled_pred: Vec::new(),
            pooled_actual: Vec::new(),
            step1_pred: Vec::new(),
            step1_actual: Vec::new(),
        };
        for (w, input) in windows.inputs.iter().enumerate() {
            let (pred, _) = self.model.forward(input);
            let start = windows.label_starts[w];
            for k in 0..self.horizon {
                let p = self.scaler.unscale(pred[k]);
                set.pooled_pred.push(p);
                set.pooled_actual.push(target[start + k]);
                if k == 0 {
                    set.step1_pred.push(p);
                    set.step1_actual.push(target[start]);
                }
            }
        }
        Ok(set)
    }

    /// Opaque persisted form: all weight tensors plus scaling statistics.
    pub fn weights_json(&self) -> serde_json::Value {
        serde_json::json!({
            "kind": "attention_lstm",
            "window": self.window,
            "horizon": self.horizon,
            "hidden": self.model.hidden,
            "scaler": self.scaler,
            "w_x": blob2(&self.model.w_x),
            "w_h": blob2(&self.model.w_h),
            "b": blob1(&self.model.b),
            "w_a": blob2(&self.model.w_a),
            "b_a": blob1(&self.model.b_a),
            "v_a": blob1(&self.model.v_a),
            "w_out": blob2(&self.model.w_out),
            "b_out": blob1(&self.model.b_out),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn synthetic(n: usize) -> (Vec<Vec<f64>>, Vec<f64>) {
        let target: Vec<f64> = (0..n).map(|i| (i as f64 * 0.15).sin() * 3.0 + 10.0).collect();
        let rows: Vec<Vec<f64>> = (0..n)
            .map(|i| vec![target[i], (i as f64 * 0.15).cos()])
            .collect();
        (rows, target)
    }

    fn hp() -> SequenceHyperParams {
        SequenceHyperParams {
            window: 8,
            hidden: 12,
            epochs: 20,
            learning_rate: 0.02,
            loss_alpha: 0.7,
            direction_steepness: 10.0,
            seed: 5,
        }
    }

    #[test]
    fn test_forward_shapes() {
        let model = AttentionLstm::new(3, 6, 2, 1);
        let x = Array2::zeros((10, 3));
        let (pred, cache) = model.forward(&x);
        assert_eq!(pred.len(), 2);
        assert_eq!(cache.hs.len(), 10);
        assert_eq!(cache.attn_w.len(), 10);
        assert!((cache.attn_w.sum() - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_loss_pure_mse_when_alpha_one() {
        let pred = Array1::from_vec(vec![2.0, 4.0]);
        let target = Array1::from_vec(vec![1.0, 2.0]);
        let (loss, _) = loss_and_grad(&pred, &target, 0.0, 1.0, 10.0);
        assert!((loss - (1.0 + 4.0) / 2.0).abs() < 1e-12);
    }

    #[test]
    fn test_directional_term_rewards_matching_sign() {
        // Correct direction from the anchor: the directional part is near 0.
        let good = Array1::from_vec(vec![2.0]);
        let bad = Array1::from_vec(vec![-2.0]);
        let target = Array1::from_vec(vec![1.0]);
        let (loss_good, _) = loss_and_grad(&good, &target, 0.0, 0.0, 10.0);
        let (loss_bad, _) = loss_and_grad(&bad, &target, 0.0, 0.0, 10.0);
        assert!(loss_good < 0.01);
        assert!(loss_bad > 1.9);
    }

    #[test]
    fn test_loss_gradient_matches_finite_difference() {
        let pred = Array1::from_vec(vec![0.5, -0.2, 0.8]);
        let target = Array1::from_vec(vec![0.3, 0.1, 0.4]);
        let (_, grad) = loss_and_grad(&pred, &target, 0.2, 0.7, 10.0);
        let eps = 1e-6;
        for k in 0..3 {
            let mut plus = pred.clone();
            plus[k] += eps;
            let mut minus = pred.clone();
            minus[k] -= eps;
            let (lp, _) = loss_and_grad(&plus, &target, 0.2, 0.7, 10.0);
            let (lm, _) = loss_and_grad(&minus, &target, 0.2, 0.7, 10.0);
            let numeric = (lp - lm) / (2.0 * eps);
            assert!(
                (grad[k] - numeric).abs() < 1e-5,
                "grad[{}] = {} vs numeric {}",
                k,
                grad[k],
                numeric
            );
        }
    }

    #[test]
    fn test_training_reduces_loss() {
        let (rows, target) = synthetic(160);
        let model = FittedSequenceModel::fit(&rows, &target, &(0..120), 1, hp()).unwrap();
        assert!(model.converged);
        let first = model.epoch_losses[0];
        let last = *model.epoch_losses.last().unwrap();
        assert!(last < first, "loss should fall: {} -> {}", first, last);
    }

    #[test]
    fn test_deterministic_under_fixed_seed() {
        let (rows, target) = synthetic(140);
        let a = FittedSequenceModel::fit(&rows, &target, &(0..100), 1, hp()).unwrap();
        let b = FittedSequenceModel::fit(&rows, &target, &(0..100), 1, hp()).unwrap();
        assert_eq!(a.epoch_losses, b.epoch_losses);
    }

    #[test]
    fn test_forecast_alignment() {
        let (rows, target) = synthetic(160);
        let model = FittedSequenceModel::fit(&rows, &target, &(0..120), 2, hp()).unwrap();
        let set = model.forecast(&rows, &target, &(120..160)).unwrap();
        assert_eq!(set.pooled_pred.len(), set.pooled_actual.len());
        assert_eq!(set.step1_pred.len() * 2, set.pooled_pred.len());
    }

    #[test]
    fn test_window_labels_stay_inside_partition() {
        let (rows, target) = synthetic(100);
        let set = build_windows(&rows, &target, &(0..70), 10, 3);
        for (w, &start) in set.label_starts.iter().enumerate() {
            assert!(start + 3 <= 70);
            assert!(start >= 10);
            assert_eq!(set.targets[w].len(), 3);
        }
    }

    #[test]
    fn test_too_few_windows_rejected() {
        let (rows, target) = synthetic(20);
        assert!(FittedSequenceModel::fit(&rows, &target, &(0..15), 1, hp()).is_err());
    }
}
