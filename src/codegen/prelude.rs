//! The `pxx_runtime` support code emitted into every generated module.
//!
//! `CORE` is always written. The Eigen sections only when the model uses
//! those families, since they need the Eigen headers.

/// Exceptions, checked argument conversion and the dispatch matcher.
pub(super) const CORE: &str = r#"namespace pxx_runtime {

struct AmbiguousInstantiationError : std::runtime_error {
    using std::runtime_error::runtime_error;
};
struct NoMatchingInstantiationError : std::runtime_error {
    using std::runtime_error::runtime_error;
};
struct ShapeMismatchError : std::runtime_error {
    using std::runtime_error::runtime_error;
};
struct RangeError : std::runtime_error {
    using std::runtime_error::runtime_error;
};

inline void register_errors(py::module_ &m) {
    py::register_exception<AmbiguousInstantiationError>(m, "AmbiguousInstantiationError", PyExc_TypeError);
    py::register_exception<NoMatchingInstantiationError>(m, "NoMatchingInstantiationError", PyExc_TypeError);
    py::register_exception<ShapeMismatchError>(m, "ShapeMismatchError", PyExc_ValueError);
    py::register_exception<RangeError>(m, "RangeError", PyExc_OverflowError);
}

// Shapes. -1 is a dynamic extent.

using Shape = std::vector<py::ssize_t>;

inline bool is_sequence(py::handle src) {
    return py::isinstance<py::sequence>(src) && !py::isinstance<py::str>(src)
        && !py::isinstance<py::bytes>(src);
}

inline Shape shape_of(py::handle src) {
    if (py::isinstance<py::array>(src)) {
        auto array = py::reinterpret_borrow<py::array>(src);
        return Shape(array.shape(), array.shape() + array.ndim());
    }
    Shape shape;
    py::object current = py::reinterpret_borrow<py::object>(src);
    while (is_sequence(current)) {
        auto length = py::len(current);
        shape.push_back(static_cast<py::ssize_t>(length));
        if (length == 0) {
            break;
        }
        current = current[py::int_(0)];
    }
    return shape;
}

inline std::string describe(const Shape &shape) {
    std::string out = "[";
    for (std::size_t i = 0; i < shape.size(); ++i) {
        if (i > 0) {
            out += ", ";
        }
        out += shape[i] < 0 ? "*" : std::to_string(shape[i]);
    }
    return out + "]";
}

inline void check_shape(py::handle src, const Shape &expected) {
    if (!py::isinstance<py::array>(src) && !is_sequence(src)) {
        return;
    }
    Shape actual = shape_of(src);
    bool matches = actual.size() == expected.size();
    for (std::size_t i = 0; matches && i < expected.size(); ++i) {
        matches = expected[i] < 0 || expected[i] == actual[i];
    }
    if (!matches) {
        throw ShapeMismatchError("shape mismatch: expected " + describe(expected) + ", got "
                                 + describe(actual));
    }
}

template <typename T, typename = void>
struct shape_traits {
    static constexpr bool checked = false;
    static Shape expected() { return {}; }
};

template <typename T, std::size_t N>
struct shape_traits<std::array<T, N>> {
    static constexpr bool checked = true;
    static Shape expected() {
        Shape shape = shape_traits<T>::expected();
        shape.insert(shape.begin(), static_cast<py::ssize_t>(N));
        return shape;
    }
};

template <typename T, typename A>
struct shape_traits<std::vector<T, A>> {
    static constexpr bool checked = true;
    static Shape expected() {
        Shape shape = shape_traits<T>::expected();
        shape.insert(shape.begin(), -1);
        return shape;
    }
};

// Scalars.

template <typename T>
void check_range(py::handle src, const char *target) {
    auto fail = [&]() {
        throw RangeError("value " + py::str(src).cast<std::string>() + " is out of range for `"
                         + target + "`");
    };
    if constexpr (std::is_same_v<T, bool>) {
        return;
    } else if constexpr (std::is_integral_v<T>) {
        if (!PyLong_Check(src.ptr()) || PyBool_Check(src.ptr())) {
            return;
        }
        if constexpr (std::is_signed_v<T>) {
            int overflow = 0;
            long long value = PyLong_AsLongLongAndOverflow(src.ptr(), &overflow);
            if (overflow != 0 || value < static_cast<long long>(std::numeric_limits<T>::min())
                || value > static_cast<long long>(std::numeric_limits<T>::max())) {
                fail();
            }
        } else {
            unsigned long long value = PyLong_AsUnsignedLongLong(src.ptr());
            if (PyErr_Occurred()) {
                PyErr_Clear();
                fail();
            }
            if (value > static_cast<unsigned long long>(std::numeric_limits<T>::max())) {
                fail();
            }
        }
    } else if constexpr (std::is_same_v<T, float>) {
        if (!PyFloat_Check(src.ptr())) {
            return;
        }
        double value = PyFloat_AsDouble(src.ptr());
        if (std::isfinite(value) && std::abs(value) > std::numeric_limits<float>::max()) {
            fail();
        }
    }
}

template <typename T>
void check(py::handle src, const char *target) {
    using U = std::decay_t<T>;
    if constexpr (std::is_arithmetic_v<U>) {
        check_range<U>(src, target);
    } else if constexpr (shape_traits<U>::checked) {
        check_shape(src, shape_traits<U>::expected());
    }
}

template <typename T>
struct Checked {
    T value{};
};

} // namespace pxx_runtime

namespace pybind11 {
namespace detail {

template <typename T>
struct type_caster<pxx_runtime::Checked<T>> {
    using inner_caster = make_caster<T>;
    PYBIND11_TYPE_CASTER(pxx_runtime::Checked<T>, inner_caster::name);

    bool load(handle src, bool convert) {
        if (convert) {
            pxx_runtime::check<T>(src, type_id<T>().c_str());
        }
        inner_caster inner;
        if (!inner.load(src, convert)) {
            return false;
        }
        value.value = cast_op<T &&>(std::move(inner));
        return true;
    }

    static handle cast(const pxx_runtime::Checked<T> &src, return_value_policy policy, handle parent) {
        return inner_caster::cast(src.value, policy, parent);
    }
};

} // namespace detail
} // namespace pybind11

namespace pxx_runtime {

// Dispatch. Mirrors the matcher of the generator: a call takes the best
// tier any entry reaches; within it the first entry wins unless another of
// the same specificity matches as well.

enum class Kind { Bool, Char, Integer, Float };
enum class Tier { Exact = 0, Compatible = 1, Generic = 2, None = 3 };
enum class Specificity { Full = 0, Partial = 1, Primary = 2 };

inline std::string element_of(py::handle src) {
    py::handle leaf = src;
    if (py::isinstance<py::array>(src)) {
        switch (py::reinterpret_borrow<py::array>(src).dtype().kind()) {
        case 'b':
            return "bool";
        case 'i':
        case 'u':
            return "int";
        case 'f':
            return "float";
        default:
            return "object";
        }
    }
    py::object current = py::reinterpret_borrow<py::object>(src);
    while (is_sequence(current) && py::len(current) > 0) {
        current = current[py::int_(0)];
    }
    leaf = current;
    if (py::isinstance<py::bool_>(leaf)) {
        return "bool";
    }
    if (py::isinstance<py::int_>(leaf)) {
        return "int";
    }
    if (py::isinstance<py::float_>(leaf)) {
        return "float";
    }
    return "object";
}

inline std::string describe(py::handle arg) {
    if (arg.is_none()) {
        return "None";
    }
    if (py::isinstance<py::bool_>(arg)) {
        return "bool";
    }
    if (py::isinstance<py::int_>(arg)) {
        return "int";
    }
    if (py::isinstance<py::float_>(arg)) {
        return "float";
    }
    if (py::isinstance<py::str>(arg)) {
        return "str";
    }
    if (py::isinstance<py::array>(arg) || is_sequence(arg)) {
        std::string shape = describe(shape_of(arg));
        return "array<" + element_of(arg) + ">" + shape;
    }
    return py::type::of(arg).attr("__name__").cast<std::string>();
}

inline std::string describe(const py::args &args) {
    std::string out;
    for (std::size_t i = 0; i < args.size(); ++i) {
        if (i > 0) {
            out += ", ";
        }
        out += describe(args[i]);
    }
    return out;
}

inline bool element_compatible(Kind element, const std::string &host) {
    if (host == "bool") {
        return element == Kind::Bool;
    }
    if (host == "int") {
        return element == Kind::Integer || element == Kind::Float;
    }
    if (host == "float") {
        return element == Kind::Float;
    }
    return false;
}

struct Pattern {
    std::function<Tier(py::handle)> match;

    static Pattern scalar(Kind kind) {
        return {[kind](py::handle arg) {
            bool is_bool = py::isinstance<py::bool_>(arg);
            bool is_int = !is_bool && py::isinstance<py::int_>(arg);
            switch (kind) {
            case Kind::Bool:
                return is_bool ? Tier::Exact : Tier::None;
            case Kind::Char:
                return py::isinstance<py::str>(arg) ? Tier::Compatible : Tier::None;
            case Kind::Integer:
                return is_int ? Tier::Exact : Tier::None;
            case Kind::Float:
                if (py::isinstance<py::float_>(arg)) {
                    return Tier::Exact;
                }
                return is_int ? Tier::Compatible : Tier::None;
            }
            return Tier::None;
        }};
    }

    static Pattern string() {
        return {[](py::handle arg) { return py::isinstance<py::str>(arg) ? Tier::Exact : Tier::None; }};
    }

    static Pattern array(Kind element, Shape dims) {
        return {[element, dims](py::handle arg) {
            if (!py::isinstance<py::array>(arg) && !is_sequence(arg)) {
                return Tier::None;
            }
            if (!element_compatible(element, element_of(arg))) {
                return Tier::None;
            }
            Shape shape = shape_of(arg);
            if (shape.size() != dims.size()) {
                return Tier::None;
            }
            for (std::size_t i = 0; i < dims.size(); ++i) {
                if (dims[i] >= 0 && dims[i] != shape[i]) {
                    return Tier::None;
                }
            }
            return Tier::Compatible;
        }};
    }

    static Pattern array_any(Kind element) {
        return {[element](py::handle arg) {
            if (!py::isinstance<py::array>(arg) && !is_sequence(arg)) {
                return Tier::None;
            }
            return element_compatible(element, element_of(arg)) ? Tier::Generic : Tier::None;
        }};
    }

    template <typename T>
    static Pattern object(bool nullable) {
        return {[nullable](py::handle arg) {
            if (arg.is_none()) {
                return nullable ? Tier::Compatible : Tier::None;
            }
            if (py::type::of(arg).is(py::type::of<T>())) {
                return Tier::Exact;
            }
            return py::isinstance<T>(arg) ? Tier::Compatible : Tier::None;
        }};
    }

    static Pattern any() {
        return {[](py::handle) { return Tier::Generic; }};
    }
};

struct Signature {
    std::vector<Pattern> params;
    std::size_t required;

    Tier match(const py::args &args) const {
        if (args.size() < required || args.size() > params.size()) {
            return Tier::None;
        }
        Tier tier = Tier::Exact;
        for (std::size_t i = 0; i < args.size(); ++i) {
            tier = std::max(tier, params[i].match(args[i]));
            if (tier == Tier::None) {
                break;
            }
        }
        return tier;
    }
};

struct Entry {
    std::string native;
    std::string binding;
    Specificity specificity;
    std::vector<Signature> signatures;
};

struct Catalogue {
    std::string name;
    std::vector<Entry> entries;

    const Entry &select(const py::args &args) const {
        std::vector<std::pair<const Entry *, Tier>> matches;
        Tier best = Tier::None;
        for (const auto &entry : entries) {
            Tier tier = Tier::None;
            for (const auto &signature : entry.signatures) {
                tier = std::min(tier, signature.match(args));
            }
            if (tier != Tier::None) {
                matches.emplace_back(&entry, tier);
                best = std::min(best, tier);
            }
        }
        if (best == Tier::None) {
            throw NoMatchingInstantiationError("no instantiation of `" + name + "` matches arguments ("
                                               + describe(args) + ")");
        }
        const Entry *first = nullptr;
        std::string rivals;
        std::size_t count = 0;
        for (const auto &[entry, tier] : matches) {
            if (tier != best) {
                continue;
            }
            if (first == nullptr) {
                first = entry;
            }
            if (entry->specificity == first->specificity) {
                rivals += (count++ > 0 ? ", " : "") + entry->native;
            }
        }
        if (count > 1) {
            throw AmbiguousInstantiationError("ambiguous call to `" + name + "`: instantiations " + rivals
                                              + " match equally well");
        }
        return *first;
    }

    py::object call(py::module_ &module, const py::args &args, const py::kwargs &kwargs) const {
        return module.attr(select(args).binding.c_str())(*args, **kwargs);
    }
};

} // namespace pxx_runtime"#;

/// Shape traits for `Eigen::Matrix` and `Eigen::Array`.
pub(super) const EIGEN_DENSE: &str = r#"namespace pxx_runtime {

inline py::ssize_t extent(int n) {
    return n == Eigen::Dynamic ? -1 : static_cast<py::ssize_t>(n);
}

template <typename S, int R, int C, int O, int MR, int MC>
struct shape_traits<Eigen::Matrix<S, R, C, O, MR, MC>> {
    static constexpr bool checked = true;
    static Shape expected() {
        if (R == 1 && C != 1) {
            return {extent(C)};
        }
        if (C == 1 && R != 1) {
            return {extent(R)};
        }
        return {extent(R), extent(C)};
    }
};

template <typename S, int R, int C, int O, int MR, int MC>
struct shape_traits<Eigen::Array<S, R, C, O, MR, MC>> : shape_traits<Eigen::Matrix<S, R, C, O, MR, MC>> {};

} // namespace pxx_runtime"#;

/// Shape traits for `Eigen::Tensor`.
pub(super) const EIGEN_TENSOR: &str = r#"namespace pxx_runtime {

template <typename S, int Rank, int O, typename I>
struct shape_traits<Eigen::Tensor<S, Rank, O, I>> {
    static constexpr bool checked = true;
    static Shape expected() { return Shape(static_cast<std::size_t>(Rank), -1); }
};

} // namespace pxx_runtime"#;
