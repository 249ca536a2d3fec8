//! C++ headers used across the integration tests.

/// A class with two constructors, two methods and a mutable and a const
/// data member.
pub const BASIC_CLASS: &str = r#"#include <string>

// pxx :: export
class TestClass {
public:
  TestClass(){};
  TestClass(int a) : a_(a){};

  const char* get_string() {return "hello";}
  int get_int() {return 42;}

  int public_member_1 = 1;
  const int public_member_2 = 2;

private:
  int a_ = 99;
  int b_ = 99;
};
"#;

/// A class template with one instance of the primary template and one of a
/// partial specialization.
pub const CLASS_TEMPLATE: &str = r#"#include <array>

#define ARRAY std::array<T, N>

// pxx :: export
// pxx :: instance(["int", "3"])
template <typename T, int N>
class Sum {
public:
  Sum() {
      data.fill(0);
      public_data.fill(1);
  }
  ARRAY get_data(int a) const { return data; }

  int get(int a) { return a; }

  std::array<T, N> public_data;

 private:
  std::array<T, N> data;
};

// pxx :: instance("Sum1", ["int"])
template <typename T>
class Sum<T, 1> {
public:
  T get_data() const { return public_data; }
  T public_data;
};
"#;

/// Function templates: `sum` and `detail::sum`, two instances each.
pub const FUNCTION_TEMPLATE: &str = r#"#include <array>

// pxx :: export
// pxx :: instance(["float", "3"])
// pxx :: instance(["double", "4"])
template<typename Scalar, size_t N>
Scalar sum(std::array<Scalar, N> x) {
    Scalar result = 0.0;
    for (size_t i = 0; i < N; ++i) {
        result += x[i];
    }
    return result;
}

namespace detail {

    // pxx :: instance("hidden_sum", ["float", "3"])
    // pxx :: export
    // pxx :: instance("hidden_sum", ["double", "4"])
    template<typename Scalar, size_t N>
    Scalar sum(std::array<Scalar, N> x) {
        Scalar result = 0.0;
        for (size_t i = 0; i < N; ++i) {
            result += x[i];
        }
        return result;
    }
}

template float sum(std::array<float, 3>);

// pxx :: export
void test(int /*a*/) {
    // nada.
}
"#;

/// Rank-3 tensor function behind an alias.
pub const TENSOR: &str = r#"#include <Eigen/CXX11/Tensor>

using Tensor3 = Eigen::Tensor<float, 3>;

// pxx :: export
Tensor3 add(Tensor3 a, Tensor3 b) {
    return a + b;
}
"#;

/// One entry point over rank-1 and rank-2 tensors.
pub const RANKED: &str = r#"#include <Eigen/CXX11/Tensor>

// pxx :: export
// pxx :: instance(["1"])
// pxx :: instance(["2"])
template <int R>
double norm(Eigen::Tensor<double, R> t);
"#;

/// A function whose parameter type has no marshaling rule next to one that
/// is fine.
pub const UNSUPPORTED: &str = r#"#include <map>

// pxx :: export
void configure(std::map<int, int> options);

// pxx :: export
int count();
"#;

/// A two-instance class template whose map field has no marshaling rule.
pub const PARTIAL_CLASS_TEMPLATE: &str = r#"#include <map>

// pxx :: export
// pxx :: instance(["int"])
// pxx :: instance(["double"])
template <typename T>
class Box {
public:
  Box(T v) : value(v) {}
  T value;
  std::map<T, T> table;
};
"#;

/// A two-instance function template whose return type has no marshaling rule.
pub const UNSUPPORTED_RETURN_TEMPLATE: &str = r#"#include <map>

// pxx :: export
// pxx :: instance(["int"])
// pxx :: instance(["double"])
template <typename T>
std::map<T, T> table(T key);
"#;
