//! Point-in-convex-polygon constraints.
//!
//! Polygons must be clockwise (seen from above, x right / y up): the
//! interior then lies on the right of each directed edge, and one
//! inequality per edge keeps the constrained point inside. A positive
//! `margin` Minkowski-shrinks the polygon.

use nalgebra::Vector2;

use crate::constraint::Constraint;
use crate::expression::Expression;

/// Inequalities keeping a 2-row `(x, y)` expression inside `polygon`.
pub fn in_polygon_xy(
    expression_xy: &Expression,
    polygon: &[Vector2<f64>],
    margin: f64,
) -> Vec<Constraint> {
    assert_eq!(
        expression_xy.rows(),
        2,
        "in_polygon_xy expects a 2-row expression"
    );
    in_polygon(
        &expression_xy.slice_rows(0, 1),
        &expression_xy.slice_rows(1, 1),
        polygon,
        margin,
    )
}

/// Inequalities keeping the point `(expression_x, expression_y)` inside
/// `polygon`.
pub fn in_polygon(
    expression_x: &Expression,
    expression_y: &Expression,
    polygon: &[Vector2<f64>],
    margin: f64,
) -> Vec<Constraint> {
    assert!(polygon.len() >= 3, "polygon needs at least 3 vertices");

    let mut constraints = Vec::with_capacity(polygon.len());

    for k in 0..polygon.len() {
        let p1 = polygon[k];
        let p2 = polygon[(k + 1) % polygon.len()];
        let edge = p2 - p1;

        let length = edge.norm();
        if length < 1e-12 {
            continue;
        }
        // Inward normal of a clockwise polygon: the right normal of the edge.
        let normal = Vector2::new(edge.y, -edge.x) / length;

        let projected = expression_x.clone() * normal.x + expression_y.clone() * normal.y;
        let offset = normal.dot(&p1) + margin;
        constraints.push(projected.ge(offset));
    }

    constraints
}

/// Whether `point` lies inside the (shrunk) polygon. Mirror of the
/// constraint above for plain points; used to check sampled trajectories.
pub fn contains(polygon: &[Vector2<f64>], point: &Vector2<f64>, margin: f64) -> bool {
    polygon.iter().enumerate().all(|(k, p1)| {
        let p2 = polygon[(k + 1) % polygon.len()];
        let edge = p2 - p1;
        let length = edge.norm();
        if length < 1e-12 {
            return true;
        }
        let normal = Vector2::new(edge.y, -edge.x) / length;
        normal.dot(&(point - p1)) >= margin
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::problem::Problem;
    use approx::assert_relative_eq;

    /// Unit square around the origin, clockwise.
    fn square() -> Vec<Vector2<f64>> {
        vec![
            Vector2::new(-0.5, -0.5),
            Vector2::new(-0.5, 0.5),
            Vector2::new(0.5, 0.5),
            Vector2::new(0.5, -0.5),
        ]
    }

    #[test]
    fn point_constrained_into_square() {
        let mut problem = Problem::new();
        let p = problem.add_variable("p", 2);

        // Pull the point far outside, but keep it constrained inside.
        problem.add_constraint(
            p.expr()
                .eq(nalgebra::DVector::from_column_slice(&[2.0, 0.3]))
                .soft(1.0),
        );
        problem.add_constraints(in_polygon_xy(&p.expr(), &square(), 0.0));
        problem.solve().unwrap();

        let value = problem.value(&p);
        assert_relative_eq!(value[0], 0.5, epsilon = 1e-5);
        assert_relative_eq!(value[1], 0.3, epsilon = 1e-5);
    }

    #[test]
    fn margin_shrinks_polygon() {
        let mut problem = Problem::new();
        let p = problem.add_variable("p", 2);

        problem.add_constraint(
            p.expr()
                .eq(nalgebra::DVector::from_column_slice(&[2.0, 0.0]))
                .soft(1.0),
        );
        problem.add_constraints(in_polygon_xy(&p.expr(), &square(), 0.1));
        problem.solve().unwrap();

        assert_relative_eq!(problem.value(&p)[0], 0.4, epsilon = 1e-5);
    }

    #[test]
    fn interior_point_satisfies_all_edges() {
        // Roundtrip property: a point inside the shrunk polygon satisfies
        // every generated inequality.
        let polygon = vec![
            Vector2::new(0.0, 0.0),
            Vector2::new(0.2, 1.0),
            Vector2::new(1.1, 0.9),
            Vector2::new(1.0, -0.2),
        ];
        let margin = 0.05;
        let point = Vector2::new(0.55, 0.4);
        assert!(contains(&polygon, &point, margin));

        let mut problem = Problem::new();
        let p = problem.add_variable("p", 2);
        let constraints = in_polygon_xy(&p.expr(), &polygon, margin);
        assert_eq!(constraints.len(), 4);

        let x = nalgebra::DVector::from_column_slice(&[point.x, point.y]);
        for constraint in &constraints {
            let residual = constraint.expression.value(&x);
            assert!(residual[0] >= 0.0, "edge violated at interior point");
        }
    }

    #[test]
    fn exterior_point_violates_an_edge() {
        assert!(!contains(&square(), &Vector2::new(0.7, 0.0), 0.0));
        assert!(!contains(&square(), &Vector2::new(0.45, 0.0), 0.1));
        assert!(contains(&square(), &Vector2::new(0.45, 0.0), 0.0));
    }
}
