use newuoa::algo::{Event, Newuoa, NewuoaOptions};
use newuoa::nalgebra as na;
use newuoa::{Domain, Function, OptimizerDriver, Problem, ProblemError};
use na::{Dyn, IsContiguous};

// https://en.wikipedia.org/wiki/Rosenbrock_function
struct Rosenbrock {
    a: f64,
    b: f64,
}

impl Problem for Rosenbrock {
    type Field = f64;

    fn domain(&self) -> Domain<Self::Field> {
        Domain::unconstrained(2)
    }
}

impl Function for Rosenbrock {
    fn apply<Sx>(&self, x: &na::Vector<Self::Field, Dyn, Sx>) -> Result<Self::Field, ProblemError>
    where
        Sx: na::storage::Storage<Self::Field, Dyn> + IsContiguous,
    {
        Ok((self.a - x[0]).powi(2) + self.b * (x[1] - x[0].powi(2)).powi(2))
    }
}

fn main() {
    let f = Rosenbrock { a: 1.0, b: 100.0 };

    let mut options = NewuoaOptions::default();
    options
        .set_rho_begin(0.5)
        .set_rho_end(1e-8)
        .set_max_evaluations(2000);

    let mut optimizer = OptimizerDriver::builder(&f)
        .with_initial(vec![-1.2, 1.0])
        .with_algo(|f, dom| Newuoa::with_options(f, dom, options))
        .build();

    optimizer
        .algo_mut()
        .set_observer(|event: &Event<'_, f64>| match event {
            Event::Start {
                dimension,
                interpolation_points,
                ..
            } => println!("n = {}, npt = {}", dimension, interpolation_points),
            Event::Iteration {
                evaluations,
                x,
                fx,
                rho,
                ..
            } if evaluations % 20 == 0 => {
                println!(
                    "{:>5}  f(x) = {:<12.6e}  rho = {:<8.1e}  x = {:?}",
                    evaluations,
                    fx,
                    rho,
                    x.as_slice()
                )
            }
            _ => {}
        });

    match optimizer.run() {
        Ok(report) => println!(
            "f({:?}) = {} after {} evaluations: {}",
            report.x.as_slice(),
            report.fx,
            report.evaluations,
            report.reason
        ),
        Err(error) => eprintln!("error: {}", error),
    }
}
