//! Derivative-free Nelder–Mead minimizer
//!
//! Coefficients and the initial simplex follow the textbook choice used by
//! most scientific stacks: reflection 1, expansion 2, contraction 0.5,
//! shrink 0.5, and a 5% perturbation of each coordinate (0.00025 for zeros).

/// Stopping criteria for the simplex search
#[derive(Debug, Clone, Copy)]
pub struct NelderMead {
    /// Absolute spread of the simplex vertices at convergence
    pub x_tolerance: f64,
    /// Absolute spread of the function values at convergence
    pub f_tolerance: f64,
    /// Maximum number of simplex iterations
    pub max_iterations: usize,
}

/// Best point found by the search
#[derive(Debug, Clone)]
pub struct Minimum {
    pub x: Vec<f64>,
    pub value: f64,
    pub iterations: usize,
    /// False when the iteration budget ran out before the tolerances were met
    pub converged: bool,
}

impl NelderMead {
    pub fn new(tolerance: f64, max_iterations: usize) -> Self {
        Self {
            x_tolerance: tolerance,
            f_tolerance: tolerance,
            max_iterations,
        }
    }

    pub fn minimize<F>(&self, f: F, x0: &[f64]) -> Minimum
    where
        F: Fn(&[f64]) -> f64,
    {
        let n = x0.len();
        let mut simplex: Vec<Vec<f64>> = Vec::with_capacity(n + 1);
        simplex.push(x0.to_vec());
        for k in 0..n {
            let mut vertex = x0.to_vec();
            vertex[k] = if vertex[k] != 0.0 { vertex[k] * 1.05 } else { 0.00025 };
            simplex.push(vertex);
        }
        let mut values: Vec<f64> = simplex.iter().map(|v| f(v)).collect();
        sort_simplex(&mut simplex, &mut values);

        let mut iterations = 0;
        let mut converged = false;
        while iterations < self.max_iterations {
            if self.has_converged(&simplex, &values) {
                converged = true;
                break;
            }

            let worst = n;
            let centroid: Vec<f64> = (0..n)
                .map(|k| simplex[..worst].iter().map(|v| v[k]).sum::<f64>() / n as f64)
                .collect();
            let worst_vertex = simplex[worst].clone();
            let along = |coefficient: f64| -> Vec<f64> {
                centroid
                    .iter()
                    .zip(&worst_vertex)
                    .map(|(c, w)| (1.0 + coefficient) * c - coefficient * w)
                    .collect()
            };

            let reflected = along(1.0);
            let f_reflected = f(&reflected);
            let mut shrink = false;

            if f_reflected < values[0] {
                let expanded = along(2.0);
                let f_expanded = f(&expanded);
                if f_expanded < f_reflected {
                    simplex[worst] = expanded;
                    values[worst] = f_expanded;
                } else {
                    simplex[worst] = reflected;
                    values[worst] = f_reflected;
                }
            } else if f_reflected < values[worst - 1] {
                simplex[worst] = reflected;
                values[worst] = f_reflected;
            } else if f_reflected < values[worst] {
                let outside = along(0.5);
                let f_outside = f(&outside);
                if f_outside <= f_reflected {
                    simplex[worst] = outside;
                    values[worst] = f_outside;
                } else {
                    shrink = true;
                }
            } else {
                let inside = along(-0.5);
                let f_inside = f(&inside);
                if f_inside < values[worst] {
                    simplex[worst] = inside;
                    values[worst] = f_inside;
                } else {
                    shrink = true;
                }
            }

            if shrink {
                let best = simplex[0].clone();
                for j in 1..=n {
                    for k in 0..n {
                        simplex[j][k] = best[k] + 0.5 * (simplex[j][k] - best[k]);
                    }
                    values[j] = f(&simplex[j]);
                }
            }

            sort_simplex(&mut simplex, &mut values);
            iterations += 1;
        }

        if !converged {
            converged = self.has_converged(&simplex, &values);
        }

        Minimum {
            x: simplex[0].clone(),
            value: values[0],
            iterations,
            converged,
        }
    }

    fn has_converged(&self, simplex: &[Vec<f64>], values: &[f64]) -> bool {
        let x_spread = simplex[1..]
            .iter()
            .flat_map(|v| v.iter().zip(&simplex[0]).map(|(a, b)| (a - b).abs()))
            .fold(0.0, f64::max);
        let f_spread = values[1..]
            .iter()
            .map(|v| (v - values[0]).abs())
            .fold(0.0, f64::max);
        x_spread <= self.x_tolerance && f_spread <= self.f_tolerance
    }
}

fn sort_simplex(simplex: &mut Vec<Vec<f64>>, values: &mut Vec<f64>) {
    let mut order: Vec<usize> = (0..values.len()).collect();
    order.sort_by(|&a, &b| values[a].total_cmp(&values[b]));
    *simplex = order.iter().map(|&i| simplex[i].clone()).collect();
    *values = order.iter().map(|&i| values[i]).collect();
}
